pub mod fs;
pub mod http;
pub mod legacy;
pub mod onnx;
