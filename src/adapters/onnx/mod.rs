pub mod annotate;
pub mod model_probe;
pub mod postprocess;
pub mod yolo_engine;
