use super::*;
use crate::audio::decode::AudioPcm;
use crate::playlist::{Track, TrackSource};
use std::path::Path;

struct ConstDecoder;

impl AudioDecoder for ConstDecoder {
    fn decode(&self, track: &Track) -> SpectrumResult<AudioPcm> {
        match track.source() {
            TrackSource::Pcm(pcm) => Ok(AudioPcm::clone(pcm)),
            TrackSource::File(p) if p.ends_with("short.wav") => Ok(AudioPcm {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                interleaved_f32: vec![0.5; 24_000],
            }),
            TrackSource::File(p) if p.ends_with("long.wav") => Ok(AudioPcm {
                sample_rate: SAMPLE_RATE,
                channels: 2,
                interleaved_f32: vec![0.75; 96_000 * 2],
            }),
            TrackSource::File(_) => Err(SpectrumError::decode("corrupt payload")),
        }
    }

    fn read_duration(&self, _path: &Path) -> SpectrumResult<f64> {
        Ok(1.0)
    }
}

fn pcm_track(id: &str, frames: usize, value: f32) -> Track {
    Track::from_pcm(
        id,
        id,
        AudioPcm {
            sample_rate: SAMPLE_RATE,
            channels: 2,
            interleaved_f32: vec![value; frames * 2],
        },
    )
    .unwrap()
}

#[test]
fn looped_duration_matches_declared_sum() {
    let mut playlist = Playlist::new();
    playlist.push(pcm_track("a", 144_000, 0.25)).unwrap();
    playlist.push(pcm_track("b", 96_000, -0.5)).unwrap();

    let tl = compose_timeline(&playlist, 2, &ConstDecoder).unwrap();
    assert_eq!(tl.len_frames(), 480_000);
    assert!((tl.duration_secs() - 10.0).abs() < 1.0 / f64::from(SAMPLE_RATE));
    assert_eq!(tl.pass_frames(), 240_000);
    assert_eq!(tl.spans()[1].start_frame, 144_000);

    // Second loop starts with the first track again.
    assert_eq!(tl.frame(0), [0.25, 0.25]);
    assert_eq!(tl.frame(144_000), [-0.5, -0.5]);
    assert_eq!(tl.frame(240_000), [0.25, 0.25]);
    assert_eq!(tl.frame(479_999), [-0.5, -0.5]);
    assert_eq!(tl.frame(480_000), [0.0, 0.0]);
}

#[test]
fn short_track_is_padded_and_long_track_truncated() {
    let mut playlist = Playlist::new();
    playlist
        .push(Track::from_file("s", "short", 1.0, "short.wav").unwrap())
        .unwrap();
    playlist
        .push(Track::from_file("l", "long", 1.0, "long.wav").unwrap())
        .unwrap();

    let tl = compose_timeline(&playlist, 1, &ConstDecoder).unwrap();
    assert_eq!(tl.len_frames(), 96_000);
    assert_eq!(tl.frame(23_999), [0.5, 0.5]);
    assert_eq!(tl.frame(24_000), [0.0, 0.0]);
    assert_eq!(tl.frame(47_999), [0.0, 0.0]);
    assert_eq!(tl.frame(48_000), [0.75, 0.75]);
    assert_eq!(tl.frame(95_999), [0.75, 0.75]);
    assert_eq!(tl.spans()[1].frames, 48_000);
}

#[test]
fn decode_failure_names_the_track() {
    let mut playlist = Playlist::new();
    playlist.push(pcm_track("a", 4_800, 0.1)).unwrap();
    playlist
        .push(Track::from_file("b", "Broken Song", 2.0, "broken.mp3").unwrap())
        .unwrap();

    let err = compose_timeline(&playlist, 1, &ConstDecoder).unwrap_err();
    match err {
        SpectrumError::Decode(msg) => {
            assert!(msg.contains("Broken Song"), "{msg}");
            assert!(msg.contains("corrupt payload"), "{msg}");
        }
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn copy_frames_crosses_loop_boundaries_and_pads_the_tail() {
    let pass: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let tl = AudioTimeline::from_pass(pass, 2, Vec::new()).unwrap();
    assert_eq!(tl.len_frames(), 8);

    let mut out = vec![-1.0; 8];
    tl.copy_frames(2, &mut out);
    assert_eq!(out, vec![4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0, 3.0]);

    let mut out = vec![-1.0; 6];
    tl.copy_frames(7, &mut out);
    assert_eq!(out, vec![6.0, 7.0, 0.0, 0.0, 0.0, 0.0]);

    assert_eq!(tl.to_interleaved().len(), 16);
}

#[test]
fn empty_playlist_and_zero_loops_are_rejected() {
    let playlist = Playlist::new();
    assert!(matches!(
        compose_timeline(&playlist, 1, &ConstDecoder),
        Err(SpectrumError::Validation(_))
    ));
    let mut playlist = Playlist::new();
    playlist.push(pcm_track("a", 480, 0.0)).unwrap();
    assert!(compose_timeline(&playlist, 0, &ConstDecoder).is_err());
}
