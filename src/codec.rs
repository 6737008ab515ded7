//! Frame scrambling for BidCoS radio frames.
//!
//! Every frame leaves the node scrambled by a running XOR chain and is
//! unscrambled the same way on reception. This is **not** encryption and
//! offers no confidentiality; it exists because the central expects it.
//!
//! ## Transform
//!
//! For a frame `buf` whose length byte is `len = buf[0]`:
//!
//! - byte 1 becomes `(!buf[1]) ^ 0x89`
//! - bytes `2..len` are chained: `acc = (acc + 0xDC) ^ buf[i]`, where `acc`
//!   starts as the transformed byte 1 and always tracks the *scrambled*
//!   previous byte
//! - the final byte `buf[len]` is XORed with the plain byte 2
//!
//! [`decode`] undoes [`encode`] exactly, so `decode(encode(f)) == f` for
//! every frame with `len >= 3`. Shorter frames, and buffers that do not hold
//! `len + 1` bytes, are left untouched.

const SEED_XOR: u8 = 0x89;
const CHAIN_ADD: u8 = 0xdc;

fn frame_len(buf: &[u8]) -> Option<usize> {
    let len = *buf.first()? as usize;
    if len < 3 || buf.len() <= len {
        return None;
    }
    Some(len)
}

/// Scrambles a plain frame in place before it is handed to the radio.
///
/// # Returns
/// `true` if the frame was transformed, `false` if it was too short or the
/// buffer is smaller than its length byte claims.
pub fn encode(buf: &mut [u8]) -> bool {
    let Some(len) = frame_len(buf) else {
        return false;
    };
    buf[1] = (!buf[1]) ^ SEED_XOR;
    let plain_second = buf[2];
    let mut acc = buf[1];
    for byte in &mut buf[2..len] {
        acc = acc.wrapping_add(CHAIN_ADD) ^ *byte;
        *byte = acc;
    }
    buf[len] ^= plain_second;
    true
}

/// Unscrambles a received frame in place.
///
/// # Returns
/// `true` if the frame was transformed, `false` if it was too short or the
/// buffer is smaller than its length byte claims.
pub fn decode(buf: &mut [u8]) -> bool {
    let Some(len) = frame_len(buf) else {
        return false;
    };
    let mut prev = buf[1];
    buf[1] = (!buf[1]) ^ SEED_XOR;
    for byte in &mut buf[2..len] {
        let scrambled = *byte;
        *byte = prev.wrapping_add(CHAIN_ADD) ^ scrambled;
        prev = scrambled;
    }
    buf[len] ^= buf[2];
    true
}
