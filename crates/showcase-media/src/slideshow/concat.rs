//! Joining rendered chunks with the concat demuxer.

use std::path::{Path, PathBuf};

use crate::command::FfmpegCommand;

/// Body of a concat demuxer list file.
pub fn concat_list(chunks: &[PathBuf]) -> String {
    chunks
        .iter()
        .map(|p| format!("file '{}'\n", escape_single_quotes(&p.to_string_lossy())))
        .collect()
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', r"'\''")
}

/// Stream-copy the listed chunks into `output` with the index up front.
pub fn concat_command(list_file: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(list_file, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .output_args(["-c", "copy"])
        .faststart()
}
