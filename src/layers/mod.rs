/// Neural network layer primitives
///
/// Building blocks for the emotion CNN:
/// - Convolution blocks (conv, ReLU, max-pool)
/// - Classification head (dense, dropout, softmax)

pub mod conv_block;
pub mod head;

pub use conv_block::ConvBlock;
pub use head::ClassifierHead;
