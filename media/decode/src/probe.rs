/*!
    Container probing.
*/

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{codec, format, media};

use revid_types::{
    CodecId, Error, MediaDuration, Rational, Result, SourceMedia, Track, TrackFormat, TrackKind,
};

use crate::audio::sample_format_from_ffmpeg;

/**
    Read container metadata and describe every decodable track.

    Streams whose decoder cannot be opened are left out; a file whose video
    cannot be decoded therefore probes as having no video tracks.
*/
pub fn probe(path: &Path) -> Result<SourceMedia> {
    crate::init()?;

    let input = format::input(path).map_err(|e| open_error(path, e))?;

    let duration = if input.duration() > 0 {
        // container duration is in AV_TIME_BASE (microseconds)
        Duration::from_micros(input.duration() as u64)
    } else {
        Duration::ZERO
    };

    let mut tracks = Vec::new();
    for stream in input.streams() {
        let parameters = stream.parameters();
        let kind = match parameters.medium() {
            media::Type::Video => TrackKind::Video,
            media::Type::Audio => TrackKind::Audio,
            _ => continue,
        };

        let time_base = rational_from_ffmpeg(stream.time_base());
        let codec_id = CodecId::from_name(parameters.id().name());

        let opened = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::codec(e.to_string()))
            .and_then(|ctx| describe(ctx, kind, &stream));

        let format = match opened {
            Ok(format) => format,
            Err(e) => {
                tracing::warn!(
                    target: "revid::probe",
                    stream = stream.index(),
                    "skipping undecodable stream: {e}"
                );
                continue;
            }
        };

        let track_duration = (stream.duration() > 0)
            .then(|| MediaDuration(stream.duration()).to_duration(time_base));
        let frame_count = (stream.frames() > 0).then_some(stream.frames() as u64);

        tracks.push(Track {
            index: stream.index(),
            kind,
            codec: codec_id,
            time_base,
            format,
            duration: track_duration,
            frame_count,
        });
    }

    tracing::debug!(
        target: "revid::probe",
        path = %path.display(),
        ?duration,
        tracks = tracks.len(),
        "probed source"
    );

    Ok(SourceMedia::new(path, duration, tracks))
}

fn describe(
    ctx: codec::context::Context,
    kind: TrackKind,
    stream: &format::stream::Stream,
) -> Result<TrackFormat> {
    match kind {
        TrackKind::Video => {
            let decoder = ctx
                .decoder()
                .video()
                .map_err(|e| Error::codec(e.to_string()))?;

            let mut frame_rate = rational_from_ffmpeg(stream.avg_frame_rate());
            if frame_rate.is_unset() {
                frame_rate = rational_from_ffmpeg(stream.rate());
            }

            Ok(TrackFormat::Video {
                width: decoder.width(),
                height: decoder.height(),
                frame_rate,
            })
        }
        TrackKind::Audio => {
            let decoder = ctx
                .decoder()
                .audio()
                .map_err(|e| Error::codec(e.to_string()))?;

            Ok(TrackFormat::Audio {
                sample_rate: decoder.rate(),
                channels: decoder.channels() as u16,
                sample_format: sample_format_from_ffmpeg(decoder.format()),
            })
        }
    }
}

/**
    Convert an FFmpeg rational, mapping a zero denominator to 0/1.
*/
pub(crate) fn rational_from_ffmpeg(r: ffmpeg_next::Rational) -> Rational {
    if r.denominator() == 0 {
        Rational { num: 0, den: 1 }
    } else {
        Rational::new(r.numerator(), r.denominator())
    }
}

pub(crate) fn open_error(path: &Path, e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::Other { errno } => Error::Io(std::io::Error::from_raw_os_error(errno)),
        e => Error::invalid_data(format!("cannot open {}: {e}", path.display())),
    }
}
