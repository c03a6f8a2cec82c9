use super::*;
use crate::job::cancel::CancelToken;
use crate::sink::MemorySink;

fn chunk(track: TrackKind, timestamp_us: i64, keyframe: bool, len: usize) -> EncodedChunk {
    EncodedChunk {
        track,
        timestamp_us,
        duration_us: Some(match track {
            TrackKind::Video => 33_333,
            TrackKind::Audio => 20_000,
        }),
        keyframe,
        data: vec![len as u8; len],
    }
}

fn muxer(sink: &MemorySink) -> Box<SampleLogMuxer> {
    let queue = WriteQueue::new(Box::new(sink.clone()), CancelToken::new());
    Box::new(SampleLogMuxer::new(queue).unwrap())
}

#[test]
fn finalized_log_indexes_every_payload() {
    let sink = MemorySink::new();
    let mut mux = muxer(&sink);
    for (i, key) in [true, false, false, true].into_iter().enumerate() {
        mux.push(chunk(TrackKind::Video, i as i64 * 33_333, key, 10 + i)).unwrap();
    }
    mux.push(chunk(TrackKind::Audio, -6_500, true, 5)).unwrap();
    mux.push(chunk(TrackKind::Audio, 13_500, true, 6)).unwrap();
    let (queue, summary) = mux.finalize().unwrap();
    queue.close().unwrap();

    let file = sink.bytes();
    assert!(sink.is_closed());
    assert_eq!(&file[..8], SAMPLE_LOG_MAGIC);
    assert_eq!(summary.file_bytes, file.len() as u64);
    assert_eq!(summary.video_samples, 4);
    assert_eq!(summary.audio_samples, 2);
    assert_eq!(summary.keyframes, 2);
    assert_eq!(summary.payload_bytes, 10 + 11 + 12 + 13 + 5 + 6);
    assert!((summary.duration_secs - 0.133_332).abs() < 1e-9);

    let log = SampleLog::parse(&file).unwrap();
    assert_eq!(log.records.len(), 6);
    let video: Vec<_> = log.track(TrackKind::Video).collect();
    assert_eq!(video[0].offset, 8);
    assert_eq!(log.payload(&file, video[3]), &[13u8; 13][..]);
    let audio: Vec<_> = log.track(TrackKind::Audio).collect();
    assert_eq!(audio[0].timestamp_us, -6_500);
    assert_eq!(log.payload(&file, audio[1]), &[6u8; 6][..]);
}

#[test]
fn regressing_timestamps_are_rejected() {
    let sink = MemorySink::new();
    let mut mux = muxer(&sink);
    mux.push(chunk(TrackKind::Video, 66_666, true, 4)).unwrap();
    mux.push(chunk(TrackKind::Audio, 0, true, 4)).unwrap();
    let err = mux.push(chunk(TrackKind::Video, 33_333, false, 4)).unwrap_err();
    assert!(matches!(err, SpectrumError::Encode(_)));
    mux.abort();
    assert!(sink.is_aborted());
}

#[test]
fn empty_video_track_cannot_finalize() {
    let sink = MemorySink::new();
    let mut mux = muxer(&sink);
    mux.push(chunk(TrackKind::Audio, 0, true, 4)).unwrap();
    assert!(matches!(mux.finalize(), Err(SpectrumError::Encode(_))));
    assert!(sink.is_aborted());
    assert!(!sink.is_closed());
}

#[test]
fn truncated_files_do_not_parse() {
    let sink = MemorySink::new();
    let mut mux = muxer(&sink);
    mux.push(chunk(TrackKind::Video, 0, true, 4)).unwrap();
    let (queue, _) = mux.finalize().unwrap();
    queue.close().unwrap();
    let file = sink.bytes();

    assert!(SampleLog::parse(&file[..file.len() - 3]).is_err());
    assert!(SampleLog::parse(b"WSPLOG0").is_err());
    assert!(SampleLog::parse(&file[1..]).is_err());
}
