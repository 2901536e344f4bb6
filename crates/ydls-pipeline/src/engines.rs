//! Argument building for the producing and consuming engines.

use std::path::PathBuf;
use std::time::Duration;

use ydls_av::{ToolRegistry, FFMPEG, YTDLP};
use ydls_core::Result;

use crate::negotiate::{ExecutionPlan, TrackDecision};

/// Position of an engine in the process chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Emits the source bytes.
    Producer,
    /// Reads the producer's bytes and writes the final container.
    Consumer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSpec {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl EngineSpec {
    /// Short program name for logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

/// The chain for `plan`: the producer alone, or producer then consumer.
///
/// # Errors
///
/// Returns [`ydls_core::Error::Tool`] when a required engine was not
/// discovered. ffmpeg is only required when the plan needs a consumer.
pub fn build_chain(tools: &ToolRegistry, url: &str, plan: &ExecutionPlan) -> Result<Vec<EngineSpec>> {
    let mut chain = vec![EngineSpec {
        stage: Stage::Producer,
        program: tools.require(YTDLP)?.path.clone(),
        args: producer_args(url, plan),
    }];

    if plan.needs_consumer() {
        chain.push(EngineSpec {
            stage: Stage::Consumer,
            program: tools.require(FFMPEG)?.path.clone(),
            args: consumer_args(plan),
        });
    }

    Ok(chain)
}

/// yt-dlp arguments writing the selected format to stdout.
pub fn producer_args(url: &str, plan: &ExecutionPlan) -> Vec<String> {
    let format = plan
        .source_format_id
        .clone()
        .unwrap_or_else(|| plan.selection.selector().to_string());

    let mut args: Vec<String> = ["--no-warnings", "--no-progress", "--no-part", "-f"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push(format);
    args.extend(["-o".to_string(), "-".to_string()]);

    if let Some(range) = &plan.time_range {
        let end = range
            .end
            .map(seconds)
            .unwrap_or_else(|| "inf".to_string());
        args.push("--download-sections".into());
        args.push(format!("*{}-{end}", seconds(range.start_or_zero())));
    }

    args.push("--".into());
    args.push(url.to_string());
    args
}

/// ffmpeg arguments reading from stdin and writing the target container to
/// stdout. Only meaningful for plans with a format.
pub fn consumer_args(plan: &ExecutionPlan) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-i", "pipe:0"]
        .into_iter()
        .map(String::from)
        .collect();

    for track in &plan.tracks {
        args.push("-map".into());
        args.push(format!("0:{}:0", track.kind.specifier()));
    }

    for track in &plan.tracks {
        let spec = track.kind.specifier();
        args.push(format!("-c:{spec}"));
        match &track.decision {
            TrackDecision::Passthrough { .. } => args.push("copy".into()),
            TrackDecision::Transcode { codec } => {
                args.push(codec.encoder.clone());
                args.extend(codec.flags.iter().cloned());
            }
        }
    }

    if let Some(format) = &plan.format {
        args.extend(format.ffmpeg_flags.iter().cloned());
    }
    args.push("-f".into());
    args.push(plan.container.clone());
    args.push("pipe:1".into());
    args
}

/// Seconds as yt-dlp section bounds expect them (`10`, `1.5`).
fn seconds(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", d.as_secs())
    } else {
        format!("{secs:.3}")
            .trim_end_matches('0')
            .to_string()
    }
}
