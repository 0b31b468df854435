use serde::{Deserialize, Serialize};

/// One (frequency, probability) hypothesis for a frame. Frequency 0 denotes
/// the unvoiced candidate; `yin_dip` is the normalized-difference value the
/// candidate was extracted from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchCandidate {
    pub frequency: f32,
    pub probability: f32,
    pub yin_dip: f32,
}

impl PitchCandidate {
    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Chosen pitch plus the full candidate set of one analysis frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchFrame {
    /// Seconds, aligned to the hop grid.
    pub timestamp: f64,
    pub frequency: f32,
    pub probability: f32,
    pub has_pitch: bool,
    #[serde(default)]
    pub candidates: Vec<PitchCandidate>,
}

impl PitchFrame {
    pub fn unvoiced(timestamp: f64, candidates: Vec<PitchCandidate>) -> Self {
        Self {
            timestamp,
            frequency: 0.0,
            probability: 0.0,
            has_pitch: false,
            candidates,
        }
    }

    /// Make the unvoiced candidate the chosen one, appending one if the
    /// extraction pass produced none.
    pub fn clear_pitch(&mut self) {
        let unvoiced = match self.candidates.iter().find(|c| !c.is_voiced()) {
            Some(c) => *c,
            None => {
                let c = PitchCandidate {
                    frequency: 0.0,
                    probability: 0.99,
                    yin_dip: 0.01,
                };
                self.candidates.push(c);
                c
            }
        };
        self.frequency = 0.0;
        self.probability = unvoiced.probability;
        self.has_pitch = false;
    }

    fn select(&mut self, candidate: PitchCandidate) {
        self.frequency = candidate.frequency;
        self.probability = candidate.probability;
        self.has_pitch = candidate.is_voiced();
    }
}

/// Ordered sequence of pitch frames, one per hop.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchTrack {
    frames: Vec<PitchFrame>,
}

impl PitchTrack {
    pub fn new(frames: Vec<PitchFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[PitchFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<PitchFrame> {
        self.frames
    }

    /// Frames with `start <= timestamp <= end`.
    pub fn frames_in(&self, start: f64, end: f64) -> impl Iterator<Item = &PitchFrame> {
        self.frames
            .iter()
            .filter(move |f| f.timestamp >= start && f.timestamp <= end)
    }

    /// Statistical median of the voiced frequencies in `[start, end]`, or 0
    /// when the range holds no voiced frame. Even counts average the two
    /// central values.
    pub fn median_pitch_in(&self, start: f64, end: f64) -> f32 {
        let mut voiced: Vec<f32> = self
            .frames_in(start, end)
            .filter(|f| f.has_pitch && f.frequency > 0.0)
            .map(|f| f.frequency)
            .collect();
        if voiced.is_empty() {
            return 0.0;
        }
        voiced.sort_by(f32::total_cmp);
        let mid = voiced.len() / 2;
        if voiced.len() % 2 == 1 {
            voiced[mid]
        } else {
            (voiced[mid - 1] + voiced[mid]) / 2.0
        }
    }

    /// Move every voiced frame in `[start, end]` to its next-higher (or
    /// next-lower) voiced candidate. Frames without an alternative in that
    /// direction are left as they are.
    pub fn shift_candidate(&mut self, start: f64, end: f64, up: bool) -> usize {
        let mut changed = 0;
        for frame in &mut self.frames {
            if frame.timestamp < start || frame.timestamp > end || !frame.has_pitch {
                continue;
            }
            let current = frame.frequency;
            let next = frame
                .candidates
                .iter()
                .filter(|c| c.is_voiced())
                .filter(|c| {
                    if up {
                        c.frequency > current
                    } else {
                        c.frequency < current
                    }
                })
                .min_by(|a, b| {
                    let da = (a.frequency - current).abs();
                    let db = (b.frequency - current).abs();
                    da.total_cmp(&db)
                })
                .copied();
            if let Some(candidate) = next {
                frame.select(candidate);
                changed += 1;
            }
        }
        changed
    }

    /// Force every frame in `[start, end]` to unvoiced.
    pub fn delete_pitch(&mut self, start: f64, end: f64) -> usize {
        let mut changed = 0;
        for frame in &mut self.frames {
            if frame.timestamp < start || frame.timestamp > end {
                continue;
            }
            if frame.has_pitch {
                changed += 1;
            }
            frame.clear_pitch();
        }
        changed
    }

    /// Replace the frames inside `[start, end]` with `region` and re-sort by
    /// timestamp. Used when a deep re-search of a selection comes back.
    pub fn merge_region(&self, start: f64, end: f64, region: Vec<PitchFrame>) -> PitchTrack {
        let mut merged: Vec<PitchFrame> = self
            .frames
            .iter()
            .filter(|f| f.timestamp < start || f.timestamp > end)
            .cloned()
            .collect();
        merged.extend(region);
        merged.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        PitchTrack::new(merged)
    }
}
