mod codec_tests;
mod writer_tests;
