use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    assert!(Fps::new(30000, 1001).is_ok());
}

#[test]
fn frames_for_secs_is_ceil_of_declared_duration() {
    let fps = Fps::whole(30).unwrap();
    assert_eq!(fps.frames_for_secs(10.0), 300);
    // A fraction of a frame past a whole count needs one more frame.
    assert_eq!(fps.frames_for_secs(1.000_01), 31);
    assert_eq!(fps.frames_for_secs(0.1 + 0.2), 9);
    assert_eq!(fps.frames_for_secs(0.0), 0);
    assert_eq!(fps.frames_for_secs(f64::NAN), 0);
    assert_eq!(Fps::new(30_000, 1001).unwrap().frames_for_secs(1.0), 30);
}

#[test]
fn timestamps_are_strictly_increasing_for_rational_fps() {
    let fps = Fps::new(30_000, 1001).unwrap();
    let mut prev = None;
    for i in 0..1000 {
        let ts = fps.frame_timestamp_us(FrameIndex(i));
        if let Some(p) = prev {
            assert!(ts > p);
        }
        prev = Some(ts);
    }
    assert_eq!(fps.frame_timestamp_us(FrameIndex(30)), 1_001_000);
}

#[test]
fn keyframe_interval_is_two_seconds() {
    assert_eq!(Fps::whole(30).unwrap().keyframe_interval(), 60);
    assert_eq!(Fps::whole(24).unwrap().keyframe_interval(), 48);
    assert_eq!(Fps::new(30_000, 1001).unwrap().keyframe_interval(), 60);
}

#[test]
fn frame_to_sample_uses_rational_fps() {
    let fps = Fps::new(30000, 1001).unwrap();
    let samples = frame_to_sample(300, fps, 48_000);
    assert!(samples > 470_000 && samples < 490_000);
    assert_eq!(frame_to_sample(0, fps, 48_000), 0);
}

#[test]
fn canvas_requires_even_dimensions_in_range() {
    assert!(Canvas::default().validate().is_ok());
    assert!(Canvas { width: 641, height: 480 }.validate().is_err());
    assert!(Canvas { width: 8, height: 8 }.validate().is_err());
    assert!(Canvas { width: 8192, height: 720 }.validate().is_err());
}

#[test]
fn sample_time_conversions_round_trip_whole_seconds() {
    assert_eq!(secs_to_samples(2.5, SAMPLE_RATE), 120_000);
    assert_eq!(samples_to_us(48_000, SAMPLE_RATE), 1_000_000);
}
