use crate::audio::timeline::AudioTimeline;
use crate::foundation::core::{CHANNELS, SAMPLE_RATE, samples_to_us};

/// Planar stereo audio block handed to the audio encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    /// Start of the block on the virtual timeline, in microseconds.
    pub timestamp_us: u64,
    pub frames: usize,
    pub planar: [Vec<f32>; 2],
}

impl AudioBlock {
    /// Interleave the two planes back into `L R L R ...`.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames * usize::from(CHANNELS));
        for (l, r) in self.planar[0].iter().zip(&self.planar[1]) {
            out.push(*l);
            out.push(*r);
        }
        out
    }
}

/// Iterator cutting a timeline into one-second planar blocks. The last block may be shorter.
#[derive(Debug)]
pub struct AudioBlocks<'a> {
    timeline: &'a AudioTimeline,
    block_frames: usize,
    next: u64,
    scratch: Vec<f32>,
}

impl<'a> AudioBlocks<'a> {
    pub fn new(timeline: &'a AudioTimeline) -> Self {
        Self::with_block_frames(timeline, SAMPLE_RATE as usize)
    }

    pub fn with_block_frames(timeline: &'a AudioTimeline, block_frames: usize) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            timeline,
            block_frames,
            next: 0,
            scratch: vec![0.0; block_frames * usize::from(CHANNELS)],
        }
    }

    /// Number of blocks this iterator yields in total.
    pub fn block_count(&self) -> u64 {
        self.timeline.len_frames().div_ceil(self.block_frames as u64)
    }
}

impl Iterator for AudioBlocks<'_> {
    type Item = AudioBlock;

    fn next(&mut self) -> Option<AudioBlock> {
        let total = self.timeline.len_frames();
        if self.next >= total {
            return None;
        }
        let frames = (total - self.next).min(self.block_frames as u64) as usize;
        let buf = &mut self.scratch[..frames * usize::from(CHANNELS)];
        self.timeline.copy_frames(self.next, buf);

        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for f in buf.chunks_exact(2) {
            left.push(f[0]);
            right.push(f[1]);
        }
        let block = AudioBlock {
            timestamp_us: samples_to_us(self.next, SAMPLE_RATE),
            frames,
            planar: [left, right],
        };
        self.next += frames as u64;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_one_second_with_short_tail() {
        let frames = 48_000 * 2 + 1_000;
        let pass: Vec<f32> = (0..frames * 2).map(|i| (i % 2) as f32).collect();
        let tl = AudioTimeline::from_pass(pass, 1, Vec::new()).unwrap();
        let blocks = AudioBlocks::new(&tl);
        assert_eq!(blocks.block_count(), 3);
        let blocks: Vec<_> = blocks.collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks.iter().map(|b| b.timestamp_us).collect::<Vec<_>>(),
            vec![0, 1_000_000, 2_000_000]
        );
        assert_eq!(blocks[2].frames, 1_000);
        assert!(blocks[0].planar[0].iter().all(|&s| s == 0.0));
        assert!(blocks[0].planar[1].iter().all(|&s| s == 1.0));
        assert_eq!(blocks[2].interleaved().len(), 2_000);
    }
}
