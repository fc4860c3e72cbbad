//! Utility modules for the transcoder.

mod ffmpeg_parser;

pub use ffmpeg_parser::{
    PROMPT_SUFFIX, ProcessEvent, Progress, ProgressParser, ProgressRecord, answer, parse_bitrate,
    parse_fatal, parse_size, parse_speed, parse_time,
};
