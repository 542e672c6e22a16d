pub mod ffmpeg_frame_decoder;
pub mod gif_frame_reader;
pub mod image_file_reader;
pub mod image_file_writer;
