use emotion_timeline_common::config::ChannelOrder;
use emotion_timeline_common::frame::FaceBox;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Side length of the square classifier input.
pub const TENSOR_SIZE: u32 = 224;
pub const TENSOR_CHANNELS: usize = 3;
pub const TENSOR_LEN: usize = (TENSOR_SIZE * TENSOR_SIZE) as usize * TENSOR_CHANNELS;

/// 224x224x3 classifier input, row-major HWC, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
    channel_order: ChannelOrder,
}

impl NormalizedTensor {
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// Value at row `y`, column `x`, channel `c` (in this tensor's channel order).
    pub fn get(&self, y: u32, x: u32, c: usize) -> f32 {
        self.data[((y * TENSOR_SIZE + x) as usize) * TENSOR_CHANNELS + c]
    }

    /// Rows of pixels of channel triples, the nesting model servers expect.
    pub fn to_nested(&self) -> Vec<Vec<[f32; TENSOR_CHANNELS]>> {
        self.data
            .chunks_exact(TENSOR_SIZE as usize * TENSOR_CHANNELS)
            .map(|row| {
                row.chunks_exact(TENSOR_CHANNELS)
                    .map(|px| [px[0], px[1], px[2]])
                    .collect()
            })
            .collect()
    }
}

/// Crop `face` out of `image`, resize to 224x224 with bilinear filtering and
/// scale each channel by 1/255.
///
/// The box is clamped to the image first. Returns `None` if nothing of the
/// box lies inside the image. Pure: the same inputs give bit-identical output.
pub fn normalize_face(
    image: &RgbImage,
    face: &FaceBox,
    channel_order: ChannelOrder,
) -> Option<NormalizedTensor> {
    let face = face.clamp_to(image.width(), image.height())?;
    debug_assert!(face.fits_within(image.width(), image.height()));
    let crop = imageops::crop_imm(image, face.x, face.y, face.width, face.height).to_image();
    let resized = imageops::resize(&crop, TENSOR_SIZE, TENSOR_SIZE, FilterType::Triangle);

    let mut data = Vec::with_capacity(TENSOR_LEN);
    for pixel in resized.pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match channel_order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        data.extend(ordered.iter().map(|&v| v as f32 / 255.0));
    }

    Some(NormalizedTensor {
        data,
        channel_order,
    })
}
