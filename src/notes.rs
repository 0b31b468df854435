//! Note segments derived from the pitch trajectory, and the pure editing
//! operations over them: create/replace from a selection, split, resize with
//! neighbor push, and boundary snapping.

use crate::analysis::track::PitchTrack;
use serde::{Deserialize, Serialize};

/// Shortest note the editor keeps, in seconds.
pub const MIN_NOTE_LEN: f64 = 0.010;

/// Snap radius in screen pixels; divided by the zoom factor to get seconds.
pub const SNAP_PX: f64 = 10.0;

/// One editable note segment. `start`/`end` are grid-aligned seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub start: f64,
    pub end: f64,
    pub pitch: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Note {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Allocator for stable note ids. Fresh ids never repeat within a session.
#[derive(Clone, Debug, Default)]
pub struct NoteIds {
    next: u64,
}

impl NoteIds {
    pub fn fresh(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    /// Advance past ids that already exist, e.g. after loading a project.
    pub fn reserve_through(&mut self, id: u64) {
        self.next = self.next.max(id);
    }
}

fn sorted(mut notes: Vec<Note>) -> Vec<Note> {
    notes.sort_by(|a, b| a.start.total_cmp(&b.start));
    notes
}

/// Replace whatever lies under the selection with one note at the median
/// pitch of the selection. Notes whose midpoint falls inside `[start, end]`
/// are removed; surviving neighbors that reach into the selection are
/// trimmed back to its edge. If the selection holds no voiced frame only
/// the removals happen.
pub fn create_or_replace(
    notes: &[Note],
    start: f64,
    end: f64,
    pitch_data: &PitchTrack,
    ids: &mut NoteIds,
) -> Vec<Note> {
    let mut result: Vec<Note> = Vec::new();
    for n in notes {
        let m = n.midpoint();
        if m >= start && m <= end {
            continue;
        }
        let mut kept = n.clone();
        if m < start {
            kept.end = kept.end.min(start);
        } else {
            kept.start = kept.start.max(end);
        }
        if kept.duration() < MIN_NOTE_LEN {
            continue;
        }
        result.push(kept);
    }

    let pitch = pitch_data.median_pitch_in(start, end);
    if pitch > 0.0 {
        result.push(Note {
            id: ids.fresh(),
            start,
            end,
            pitch,
            state: None,
        });
    }
    sorted(result)
}

/// Split a note at `t`. Valid only when `t` leaves at least 10 ms on both
/// sides; otherwise the list is returned unchanged and `false` is reported.
/// Each half takes the median pitch of its own range, falling back to the
/// original pitch where the range holds no voiced frame. Both halves get
/// fresh ids.
pub fn split_note(
    notes: &[Note],
    id: u64,
    t: f64,
    pitch_data: &PitchTrack,
    ids: &mut NoteIds,
) -> (Vec<Note>, bool) {
    let Some(note) = notes.iter().find(|n| n.id == id) else {
        return (notes.to_vec(), false);
    };
    if t <= note.start + MIN_NOTE_LEN || t >= note.end - MIN_NOTE_LEN {
        return (notes.to_vec(), false);
    }

    let left_pitch = match pitch_data.median_pitch_in(note.start, t) {
        p if p > 0.0 => p,
        _ => note.pitch,
    };
    let right_pitch = match pitch_data.median_pitch_in(t, note.end) {
        p if p > 0.0 => p,
        _ => note.pitch,
    };

    let mut result: Vec<Note> = notes.iter().filter(|n| n.id != id).cloned().collect();
    result.push(Note {
        id: ids.fresh(),
        start: note.start,
        end: t,
        pitch: left_pitch,
        state: note.state.clone(),
    });
    result.push(Note {
        id: ids.fresh(),
        start: t,
        end: note.end,
        pitch: right_pitch,
        state: note.state.clone(),
    });
    (sorted(result), true)
}

/// Resize a note and push neighbors out of the way.
///
/// Overlapping neighbors lose the overlapped edge: a neighbor reaching past
/// the new end is pushed to start there, the mirror case is pushed to end at
/// the new start, and a neighbor swallowed whole shrinks below the minimum
/// duration and is deleted. Every touched note has its pitch recomputed from
/// the pitch data over its new range, keeping the old pitch where the range
/// has gone unvoiced.
pub fn resize_with_push(
    notes: &[Note],
    id: u64,
    new_start: f64,
    new_end: f64,
    pitch_data: &PitchTrack,
) -> Vec<Note> {
    if new_end - new_start < MIN_NOTE_LEN || !notes.iter().any(|n| n.id == id) {
        return notes.to_vec();
    }

    let mut result = Vec::with_capacity(notes.len());
    for n in notes {
        if n.id == id {
            let mut target = n.clone();
            target.start = new_start;
            target.end = new_end;
            target.pitch = recomputed_pitch(pitch_data, new_start, new_end, n.pitch);
            result.push(target);
            continue;
        }

        let overlaps = new_start < n.end && new_end > n.start;
        if !overlaps {
            result.push(n.clone());
            continue;
        }

        let mut pushed = n.clone();
        if n.start >= new_start && n.end > new_end {
            pushed.start = new_end;
        } else if n.end <= new_end && n.start < new_start {
            pushed.end = new_start;
        } else if n.start < new_start {
            pushed.end = new_start;
        } else {
            pushed.start = new_end;
        }

        if pushed.duration() < MIN_NOTE_LEN {
            continue;
        }
        pushed.pitch = recomputed_pitch(pitch_data, pushed.start, pushed.end, n.pitch);
        result.push(pushed);
    }

    sorted(result)
}

fn recomputed_pitch(pitch_data: &PitchTrack, start: f64, end: f64, previous: f32) -> f32 {
    match pitch_data.median_pitch_in(start, end) {
        p if p > 0.0 => p,
        _ => previous,
    }
}

/// Snap `t` to the nearest interesting time within `SNAP_PX / zoom` seconds:
/// another note's edge, the frame grid, zero, or the end of the recording,
/// considered in that order with the first candidate winning ties. Holding
/// shift bypasses snapping.
pub fn snap_to_boundary(
    t: f64,
    notes: &[Note],
    zoom: f64,
    frame_duration: f64,
    duration: f64,
    ignore_id: Option<u64>,
    shift_held: bool,
) -> f64 {
    if shift_held || zoom <= 0.0 {
        return t;
    }
    let tolerance = SNAP_PX / zoom;

    let mut best: Option<(f64, f64)> = None;
    let mut consider = |candidate: f64| {
        let dist = (candidate - t).abs();
        if dist <= tolerance && best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, candidate));
        }
    };

    for note in notes {
        if Some(note.id) == ignore_id {
            continue;
        }
        consider(note.start);
        consider(note.end);
    }
    if frame_duration > 0.0 {
        consider((t / frame_duration).round() * frame_duration);
    }
    consider(0.0);
    consider(duration);

    best.map_or(t, |(_, v)| v)
}

/// True when the list is sorted, pairwise non-overlapping, and every note is
/// at least the minimum length. The editing operations above all preserve
/// this.
pub fn is_well_formed(notes: &[Note]) -> bool {
    notes.windows(2).all(|w| w[0].end <= w[1].start + 1e-9)
        && notes
            .iter()
            .all(|n| n.duration() >= MIN_NOTE_LEN - 1e-9 && n.pitch > 0.0)
}
