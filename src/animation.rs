//! Spline-compressed animation decoding.
//!
//! The compressed stream is partitioned into fixed time-span blocks. Each
//! block opens with a per-bone quantization-mode header, then carries a
//! sequence of sample runs (one per quantized track): a keyframe count, a
//! duplicate allowance, single-byte timestamps relative to the block start,
//! and the quantized rotation samples themselves.

use glam::Quat;

use crate::error::ConvertError;

/// Frames covered by one block; timestamps inside a block are single bytes.
pub const BLOCK_FRAME_SPAN: u32 = 255;

/// Rotation encoding schemes found in the wild.
///
/// Only `Smallest3_40` and `Uncompressed128` are decodable; the others are
/// recognized so they can be rejected instead of misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationQuantization {
    Polar32,
    Smallest3_40,
    Smallest3_48,
    Smallest3_24,
    Straight16,
    Uncompressed128,
}

impl RotationQuantization {
    fn from_bits(bits: u8) -> Result<Self, ConvertError> {
        match bits {
            0 => Ok(Self::Polar32),
            1 => Ok(Self::Smallest3_40),
            2 => Ok(Self::Smallest3_48),
            3 => Ok(Self::Smallest3_24),
            4 => Ok(Self::Straight16),
            5 => Ok(Self::Uncompressed128),
            _ => Err(ConvertError::UnknownQuantizationMask(bits)),
        }
    }
}

/// Scalar (translation/scale) quantization width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarQuantization {
    Bits8,
    Bits16,
}

impl ScalarQuantization {
    fn from_bits(bits: u8) -> Result<Self, ConvertError> {
        match bits {
            0 => Ok(Self::Bits8),
            1 => Ok(Self::Bits16),
            _ => Err(ConvertError::UnknownQuantizationMask(bits)),
        }
    }
}

/// Per-track quantization modes, unpacked from one header byte.
#[derive(Debug, Clone, Copy)]
pub struct TrackQuantization {
    pub translation: ScalarQuantization,
    pub rotation: RotationQuantization,
    pub scale: ScalarQuantization,
}

impl TrackQuantization {
    /// Bits 0-1: translation, bits 2-5: rotation, bits 6-7: scale.
    pub fn from_mask(mask: u8) -> Result<Self, ConvertError> {
        Ok(Self {
            translation: ScalarQuantization::from_bits(mask & 0x03)?,
            rotation: RotationQuantization::from_bits((mask >> 2) & 0x0F)?,
            scale: ScalarQuantization::from_bits((mask >> 6) & 0x03)?,
        })
    }
}

/// Block metadata plus the raw compressed byte region, as handed over by the
/// animation container layer.
#[derive(Debug, Clone, Default)]
pub struct SplineCompressedAnimation {
    pub name: String,
    pub num_frames: u32,
    pub num_blocks: u32,
    /// Byte size of a block's mask-and-quantization header; one 4-byte
    /// aligned mode byte per bone.
    pub mask_and_quantization_size: u32,
    pub block_duration: f64,
    pub block_inverse_duration: f64,
    pub frame_duration: f64,
    /// Byte offset of each block within `data`.
    pub block_offsets: Vec<u32>,
    pub data: Vec<u8>,
}

/// One decoded sample: global frame index plus rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyFrame {
    pub frame_index: u32,
    pub rotation: Quat,
}

/// The samples of one run, belonging to one quantized track.
#[derive(Debug, Clone)]
pub struct TrackRun {
    pub quantization: TrackQuantization,
    pub keys: Vec<KeyFrame>,
}

/// All sample runs of one block, in track order.
///
/// Keys are neither deduplicated nor sorted; that is the consumer's call.
#[derive(Debug, Clone, Default)]
pub struct KeyFrameBlock {
    pub tracks: Vec<TrackRun>,
}

/// A fully decoded animation, ready to pair with a joint-order list.
#[derive(Debug, Clone)]
pub struct DecodedAnimation {
    pub name: String,
    pub num_frames: u32,
    pub frame_duration: f32,
    pub blocks: Vec<KeyFrameBlock>,
}

impl SplineCompressedAnimation {
    /// Decodes every block of the compressed stream.
    ///
    /// Decoding is all-or-nothing: any structural defect or unsupported
    /// encoding fails the whole animation.
    pub fn decode(&self) -> Result<Vec<KeyFrameBlock>, ConvertError> {
        let mut blocks = Vec::with_capacity(self.block_offsets.len());
        for (block_index, &offset) in self.block_offsets.iter().enumerate() {
            let start = offset as usize;
            let end = self
                .block_offsets
                .get(block_index + 1)
                .map(|&o| o as usize)
                .unwrap_or(self.data.len());
            if start > end || end > self.data.len() {
                return Err(ConvertError::MalformedBlockOffset {
                    block: block_index,
                    offset: start,
                    len: self.data.len(),
                });
            }
            blocks.push(self.decode_block(block_index, &self.data[start..end])?);
        }
        Ok(blocks)
    }

    fn decode_block(&self, block: usize, bytes: &[u8]) -> Result<KeyFrameBlock, ConvertError> {
        let mut r = Reader::new(bytes, block);

        // Header: one mode byte per bone, 4-byte aligned, then one trailing
        // float of unused metadata.
        let track_count = (self.mask_and_quantization_size / 4) as usize;
        let mut modes = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            modes.push(TrackQuantization::from_mask(r.read_u8()?)?);
            r.skip(3)?;
        }
        r.read_f32()?;

        let mut tracks: Vec<TrackRun> = Vec::new();
        let frame_base = BLOCK_FRAME_SPAN * block as u32;

        loop {
            if r.remaining() < 4 || r.rest_is_zero() {
                break;
            }
            let quantization = match modes.get(tracks.len()) {
                Some(&q) => q,
                None => {
                    return Err(ConvertError::TrackOverrun {
                        block,
                        tracks: track_count,
                    })
                }
            };

            let num_keyframes = r.read_u16()? as usize;
            // Duplicate timestamps within a run are legal up to this count;
            // they are kept as-is, never rejected.
            let _max_duplicates = r.read_u16()?;
            r.skip_zero_bytes();

            let mut frame_indices = Vec::with_capacity(num_keyframes + 1);
            for _ in 0..=num_keyframes {
                frame_indices.push(frame_base + r.read_u8()? as u32);
            }
            r.skip_zero_bytes();

            let mut keys = Vec::with_capacity(num_keyframes + 1);
            for frame_index in frame_indices {
                keys.push(KeyFrame {
                    frame_index,
                    rotation: read_quaternion(&mut r, quantization.rotation)?,
                });
            }

            tracks.push(TrackRun { quantization, keys });
        }

        Ok(KeyFrameBlock { tracks })
    }
}

fn read_quaternion(r: &mut Reader<'_>, mode: RotationQuantization) -> Result<Quat, ConvertError> {
    match mode {
        RotationQuantization::Smallest3_40 => {
            let mut bytes = [0u8; 5];
            for b in &mut bytes {
                *b = r.read_u8()?;
            }
            Ok(unpack_quaternion40(bytes))
        }
        RotationQuantization::Uncompressed128 => Ok(Quat::from_xyzw(
            r.read_f32()?,
            r.read_f32()?,
            r.read_f32()?,
            r.read_f32()?,
        )),
        other => Err(ConvertError::UnsupportedRotationQuantization(other)),
    }
}

/// Unpacks the irregular 40-bit smallest-three quaternion encoding.
///
/// Bits 0-12, 13-25, 26-37 are signed component values; bits 38-39 select
/// which slot holds the largest component, reconstructed as +1.0. The three
/// decoded values fill the remaining slots in order, normalized by 8191,
/// 8191, and 4095 respectively.
pub fn unpack_quaternion40(bytes: [u8; 5]) -> Quat {
    let mut packed = 0u64;
    for (i, b) in bytes.iter().enumerate() {
        packed |= (*b as u64) << (8 * i);
    }

    let small = [
        sign_extend((packed & 0x1FFF) as u32, 13) as f32 / 8191.0,
        sign_extend(((packed >> 13) & 0x1FFF) as u32, 13) as f32 / 8191.0,
        sign_extend(((packed >> 26) & 0x0FFF) as u32, 12) as f32 / 4095.0,
    ];
    let largest = ((packed >> 38) & 0x03) as usize;

    let mut components = [0.0f32; 4];
    components[largest] = 1.0;
    let mut k = 0;
    for (i, slot) in components.iter_mut().enumerate() {
        if i != largest {
            *slot = small[k];
            k += 1;
        }
    }

    Quat::from_array(components)
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Byte cursor over one block's range; failures carry the block index.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    block: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], block: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            block,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn truncated(&self) -> ConvertError {
        ConvertError::TruncatedAnimation {
            block: self.block,
            offset: self.pos,
        }
    }

    fn read_u8(&mut self) -> Result<u8, ConvertError> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16, ConvertError> {
        if self.remaining() < 2 {
            return Err(self.truncated());
        }
        let v = u16::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn read_f32(&mut self) -> Result<f32, ConvertError> {
        if self.remaining() < 4 {
            return Err(self.truncated());
        }
        let v = f32::from_le_bytes([
            self.bytes[self.pos],
            self.bytes[self.pos + 1],
            self.bytes[self.pos + 2],
            self.bytes[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    fn skip(&mut self, n: usize) -> Result<(), ConvertError> {
        if self.remaining() < n {
            return Err(self.truncated());
        }
        self.pos += n;
        Ok(())
    }

    fn skip_zero_bytes(&mut self) {
        while self.bytes.get(self.pos) == Some(&0) {
            self.pos += 1;
        }
    }

    fn rest_is_zero(&self) -> bool {
        self.bytes[self.pos..].iter().all(|&b| b == 0)
    }
}
