/*!
    Export progress reporting.
*/

use tokio::sync::mpsc::UnboundedSender;

/**
    Phase of an export.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Reading source metadata.
    Probing,
    /// Decoding and buffering the video track.
    ReadingVideo,
    /// Writing the audio track to the intermediate store.
    ExportingAudio,
    /// Writing reversed frames to the output.
    Writing,
    /// Flushing encoders and closing the container.
    Finalizing,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Probing => "probing",
            Self::ReadingVideo => "reading video",
            Self::ExportingAudio => "exporting audio",
            Self::Writing => "writing",
            Self::Finalizing => "finalizing",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/**
    How far along an operation is.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressValue {
    /// Completed fraction in `[0, 1]`.
    Fraction(f32),
    /// The operation's length cannot be estimated.
    Indeterminate,
}

/**
    One progress update.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    pub operation: Operation,
    pub value: ProgressValue,
}

impl Progress {
    pub fn fraction(&self) -> Option<f32> {
        match self.value {
            ProgressValue::Fraction(f) => Some(f),
            ProgressValue::Indeterminate => None,
        }
    }
}

/// Smallest fraction change worth an update.
const MIN_STEP: f32 = 0.005;

/**
    Sends progress to the export handle, dropping updates too small to see.

    A closed receiver is not an error; the export keeps going.
*/
pub(crate) struct ProgressReporter {
    tx: UnboundedSender<Progress>,
    last: Option<Progress>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: UnboundedSender<Progress>) -> Self {
        Self { tx, last: None }
    }

    pub(crate) fn indeterminate(&mut self, operation: Operation) {
        self.send(Progress {
            operation,
            value: ProgressValue::Indeterminate,
        });
    }

    pub(crate) fn fraction(&mut self, operation: Operation, done: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0) as f32
        };

        if let Some(Progress {
            operation: last_op,
            value: ProgressValue::Fraction(last),
        }) = self.last
        {
            let finished = fraction >= 1.0 && last < 1.0;
            if last_op == operation && !finished && (fraction - last).abs() < MIN_STEP {
                return;
            }
        }

        self.send(Progress {
            operation,
            value: ProgressValue::Fraction(fraction),
        });
    }

    fn send(&mut self, progress: Progress) {
        if self.last == Some(progress) {
            return;
        }
        self.last = Some(progress);
        let _ = self.tx.send(progress);
    }
}
