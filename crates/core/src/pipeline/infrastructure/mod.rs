pub mod background_detector;
