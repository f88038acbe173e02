#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("code image length {0} is odd; instructions are 16-bit words")]
    OddLength(usize),
    #[error("code image of {0} bytes has no reset vector")]
    MissingResetVector(usize),
}

/// Offset of the reset vector holding the entry point.
pub const RESET_VECTOR: u32 = 2;

/// Read-only code image mapped at address 0. Addresses past the end wrap
/// around the image length.
#[derive(Clone)]
pub struct CodeImage {
    mem: Vec<u8>,
}

impl CodeImage {
    pub fn new(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() % 2 != 0 {
            return Err(ImageError::OddLength(bytes.len()));
        }
        if bytes.len() < 4 {
            return Err(ImageError::MissingResetVector(bytes.len()));
        }
        Ok(Self { mem: bytes.to_vec() })
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }

    /// Maps any address into the image and onto a word boundary.
    pub fn wrap(&self, addr: u32) -> u32 {
        ((addr as usize % self.mem.len()) as u32) & !1
    }

    fn load_le_u16(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.mem[off], self.mem[off + 1]])
    }

    pub fn read_u16(&self, addr: u32) -> u16 {
        self.load_le_u16(self.wrap(addr) as usize)
    }

    pub fn entry(&self) -> u32 {
        u32::from(self.read_u16(RESET_VECTOR))
    }
}

impl std::fmt::Debug for CodeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeImage").field("len", &self.mem.len()).finish()
    }
}

/// Address of the word after `pc`. The program counter wraps inside its
/// 64K segment.
pub fn next_pc(pc: u32) -> u32 {
    (pc & 0xF_0000) | (pc.wrapping_add(2) & 0xFFFF)
}

/// Fetch position over a [`CodeImage`] that remembers every word consumed
/// by the instruction being decoded.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    image: &'a CodeImage,
    start: u32,
    pc: u32,
    words: Vec<u16>,
}

impl<'a> Cursor<'a> {
    pub fn new(image: &'a CodeImage, pc: u32) -> Self {
        Self { image, start: pc, pc, words: Vec::new() }
    }

    pub fn fetch(&mut self) -> u16 {
        let w = self.image.read_u16(self.pc);
        self.words.push(w);
        self.pc = next_pc(self.pc);
        w
    }

    /// Address of the next word to fetch.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Address of the first word fetched since the last [`Cursor::take`].
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Drops words fetched after the first `n`, moving the pc back.
    pub fn truncate(&mut self, n: usize) {
        let mut pc = self.start;
        for _ in 0..n.min(self.words.len()) {
            pc = next_pc(pc);
        }
        self.words.truncate(n);
        self.pc = pc;
    }

    /// Hands out the consumed words and starts a new instruction at the pc.
    pub fn take(&mut self) -> (u32, Vec<u16>) {
        let start = std::mem::replace(&mut self.start, self.pc);
        (start, std::mem::take(&mut self.words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_images() {
        assert_eq!(CodeImage::new(&[0, 1, 2]).unwrap_err(), ImageError::OddLength(3));
        assert_eq!(CodeImage::new(&[0, 1]).unwrap_err(), ImageError::MissingResetVector(2));
    }

    #[test]
    fn reads_reset_vector_little_endian() {
        let img = CodeImage::new(&[0, 0, 0x34, 0x12]).unwrap();
        assert_eq!(img.entry(), 0x1234);
        assert_eq!(img.read_u16(4), 0x0000);
        assert_eq!(img.wrap(0x1_0007), 2);
    }

    #[test]
    fn cursor_tracks_words_and_rewinds() {
        let img = CodeImage::new(&[1, 0, 2, 0, 3, 0, 4, 0]).unwrap();
        let mut cur = Cursor::new(&img, 2);
        assert_eq!(cur.fetch(), 2);
        assert_eq!(cur.fetch(), 3);
        assert_eq!(cur.pc(), 6);
        cur.truncate(1);
        assert_eq!(cur.pc(), 4);
        assert_eq!(cur.words(), &[2]);
        let (start, words) = cur.take();
        assert_eq!((start, words), (2, vec![2]));
        assert_eq!(cur.start(), 4);
    }

    #[test]
    fn pc_wraps_inside_segment() {
        assert_eq!(next_pc(0x1_FFFE), 0x1_0000);
        assert_eq!(next_pc(0x0_0100), 0x0_0102);
    }
}
