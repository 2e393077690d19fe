use super::AIModel;
use crate::caption::CaptionResult;
use bytes::Bytes;

/// Encoded image bytes as uploaded.
pub type ImageCaptionInput = Bytes;
pub type ImageCaptionOutput = CaptionResult;
pub type ImageCaptionModel = AIModel<ImageCaptionInput, ImageCaptionOutput>;
