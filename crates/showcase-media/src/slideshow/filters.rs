//! Filter graphs for slideshow chunks.
//!
//! Each chunk is one FFmpeg invocation: every image is a looped still input,
//! normalized to the output frame, then joined with the chunk's transitions.
//! The visible time per image is always the configured display duration, so
//! a chunk of `n` images lasts exactly `n * d`.

use std::fmt::Write;

use showcase_models::{Resolution, TransitionEffect};

/// Output-side parameters shared by every chunk of one render.
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    pub resolution: Resolution,
    pub fps: u32,
    pub background: String,
    /// Seconds each image is visible
    pub image_duration: f64,
    pub transition: TransitionEffect,
    /// Configured ramp length; clamped to half the display duration
    pub transition_secs: f64,
}

impl ChunkLayout {
    /// Effective ramp length.
    pub fn ramp(&self) -> f64 {
        self.transition_secs.min(self.image_duration / 2.0).max(0.0)
    }

    /// How long input `index` of an `n`-image chunk must be read.
    ///
    /// Crossfaded clips overlap their successor by the ramp length.
    pub fn input_duration(&self, index: usize, n: usize) -> f64 {
        match self.transition {
            TransitionEffect::Crossfade if index + 1 < n => self.image_duration + self.ramp(),
            _ => self.image_duration,
        }
    }

    pub fn chunk_duration(&self, n: usize) -> f64 {
        self.image_duration * n as f64
    }

    fn normalize(&self) -> String {
        let Resolution { width, height } = self.resolution.even();
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={bg},setsar=1,fps={fps},format=yuv420p",
            w = width,
            h = height,
            bg = self.background,
            fps = self.fps
        )
    }

    /// Video filter graph for `n` image inputs (`0..n`), ending in `[vout]`.
    pub fn video_graph(&self, n: usize) -> String {
        let mut graph = String::new();
        let ramp = self.ramp();
        let d = self.image_duration;
        let normalize = self.normalize();

        for i in 0..n {
            let _ = write!(graph, "[{i}:v]{normalize}");
            let first = i == 0;
            let last = i + 1 == n;
            if ramp > 0.0 {
                match self.transition {
                    TransitionEffect::None => {}
                    TransitionEffect::Fade => {
                        if !first {
                            let _ = write!(graph, ",fade=t=in:st=0:d={ramp:.3}");
                        }
                        if !last {
                            let _ = write!(graph, ",fade=t=out:st={:.3}:d={ramp:.3}", d - ramp);
                        }
                    }
                    TransitionEffect::Crossfade => {
                        // Chunk edges fade through the background; interior
                        // boundaries are blended by xfade below.
                        if first {
                            let _ = write!(graph, ",fade=t=in:st=0:d={ramp:.3}");
                        }
                        if last {
                            let _ = write!(graph, ",fade=t=out:st={:.3}:d={ramp:.3}", d - ramp);
                        }
                    }
                }
            }
            let _ = write!(graph, "[v{i}];");
        }

        if self.transition == TransitionEffect::Crossfade && ramp > 0.0 && n > 1 {
            let mut prev = "v0".to_string();
            for i in 1..n {
                let out = if i + 1 == n { "vout".to_string() } else { format!("x{i}") };
                let _ = write!(
                    graph,
                    "[{prev}][v{i}]xfade=transition=fade:duration={ramp:.3}:offset={:.3}[{out}]",
                    i as f64 * d
                );
                if i + 1 < n {
                    graph.push(';');
                }
                prev = out;
            }
        } else {
            for i in 0..n {
                let _ = write!(graph, "[v{i}]");
            }
            let _ = write!(graph, "concat=n={n}:v=1:a=0[vout]");
        }

        graph
    }
}

/// Extra repetitions (`-stream_loop`) needed for a track to cover `total` seconds.
///
/// `-1` (loop indefinitely) when the track length is unknown; the trim in
/// [`audio_graph`] bounds the output either way.
pub fn plan_audio_loops(audio_duration: Option<f64>, total: f64) -> i32 {
    match audio_duration {
        Some(len) if len > 0.0 && len.is_finite() => {
            let plays = (total / len).ceil().max(1.0);
            (plays as i32 - 1).max(0)
        }
        _ => -1,
    }
}

/// Audio branch: trim input `index` to `total` seconds at `volume`, ending in `[aout]`.
pub fn audio_graph(index: usize, total: f64, volume: f64) -> String {
    format!(
        "[{index}:a]atrim=duration={total:.3},asetpts=PTS-STARTPTS,volume={volume}[aout]"
    )
}
