//! RC4 stream cipher used by security handler revisions 2 to 4

/// RC4 cipher state
pub struct Rc4 {
    s: [u8; 256],
    i: usize,
    j: usize,
}

impl Rc4 {
    /// Create a new RC4 cipher with the given key (1 to 256 bytes)
    pub fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, byte) in s.iter_mut().enumerate() {
            *byte = i as u8;
        }

        // key scheduling
        if !key.is_empty() {
            let mut j = 0usize;
            for i in 0..256 {
                j = (j + s[i] as usize + key[i % key.len()] as usize) % 256;
                s.swap(i, j);
            }
        }

        Self { s, i: 0, j: 0 }
    }

    /// Process data in place (encryption and decryption are the same)
    pub fn process_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = (self.i + 1) % 256;
            self.j = (self.j + self.s[self.i] as usize) % 256;
            self.s.swap(self.i, self.j);

            let k = self.s[(self.s[self.i] as usize + self.s[self.j] as usize) % 256];
            *byte ^= k;
        }
    }
}

/// One-shot RC4 over a buffer
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut output = data.to_vec();
    Rc4::new(key).process_in_place(&mut output);
    output
}
