pub mod frame_sequence_reader;
pub mod image_writer;
pub mod video_frame_decoder;
