pub mod locate;
pub mod normalize;

pub use locate::{select_primary_face, FaceLocator};
pub use normalize::{normalize_face, NormalizedTensor, TENSOR_SIZE};
