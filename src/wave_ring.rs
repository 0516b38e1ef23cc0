use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

/// Lifecycle of one output slot: `Free -> Prepared -> Submitted -> Done -> Free`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SlotState {
    Free,
    Prepared,
    Submitted,
    Done,
}

struct Slot {
    state: SlotState,
    samples: Vec<i16>,
}

struct RingState {
    slots: Vec<Slot>,
    submitted: VecDeque<usize>,
    play_cursor: usize,
    underruns: u64,
    closed: bool,
}

/// A fixed ring of output buffers shared by the mixer thread, which fills and submits slots in
/// ring order, and the audio device, which plays submitted slots and hands them back as done.
pub struct WaveRing {
    state: Mutex<RingState>,
    slot_done: Condvar,
    slot_len: usize,
}

impl WaveRing {
    /// Every slot starts out done, so the first pass of the mixer never waits.
    pub fn new(slot_count: usize, slot_len: usize) -> Self {
        let slots = (0..slot_count)
            .map(|_| Slot {
                state: SlotState::Done,
                samples: vec![0; slot_len],
            })
            .collect();
        Self {
            state: Mutex::new(RingState {
                slots,
                submitted: VecDeque::with_capacity(slot_count),
                play_cursor: 0,
                underruns: 0,
                closed: false,
            }),
            slot_done: Condvar::new(),
            slot_len,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot_state(&self, idx: usize) -> SlotState {
        self.lock().slots[idx].state
    }

    pub fn underruns(&self) -> u64 {
        self.lock().underruns
    }

    /// Blocks until slot `idx` has been played, reclaims it and checks its sample buffer out for
    /// writing. Returns `None` once the ring is closed.
    pub fn claim(&self, idx: usize) -> Option<Vec<i16>> {
        let mut state = self
            .slot_done
            .wait_while(self.lock(), |state| {
                !state.closed && state.slots[idx].state != SlotState::Done
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }

        let slot = &mut state.slots[idx];
        slot.state = SlotState::Free;
        let mut samples = std::mem::take(&mut slot.samples);
        samples.clear();
        samples.resize(self.slot_len, 0);
        slot.state = SlotState::Prepared;
        Some(samples)
    }

    /// Returns a filled buffer to slot `idx` and queues it for playback.
    pub fn submit(&self, idx: usize, samples: Vec<i16>) {
        let mut state = self.lock();
        debug_assert_eq!(state.slots[idx].state, SlotState::Prepared);
        let slot = &mut state.slots[idx];
        slot.samples = samples;
        slot.state = SlotState::Submitted;
        state.submitted.push_back(idx);
    }

    /// Device side: fills `out` from the submitted slots in submission order and returns the
    /// number of samples taken from the ring. Anything past that is silence.
    pub fn play(&self, out: &mut [i16]) -> usize {
        let mut state = self.lock();
        let mut written = 0;
        let mut finished_any = false;

        while written < out.len() {
            let idx = match state.submitted.front() {
                Some(idx) => *idx,
                None => break,
            };
            let cursor = state.play_cursor;
            let slot = &mut state.slots[idx];
            let count = (slot.samples.len() - cursor).min(out.len() - written);
            out[written..written + count].copy_from_slice(&slot.samples[cursor..cursor + count]);
            written += count;

            if cursor + count == slot.samples.len() {
                slot.state = SlotState::Done;
                state.submitted.pop_front();
                state.play_cursor = 0;
                finished_any = true;
            } else {
                state.play_cursor = cursor + count;
            }
        }

        if written < out.len() {
            for sample in &mut out[written..] {
                *sample = 0;
            }
            state.underruns += 1;
            log::trace!("Wave ring underrun, {} samples of silence", out.len() - written);
        }
        drop(state);

        if finished_any {
            self.slot_done.notify_all();
        }
        written
    }

    /// Wakes and stops anyone waiting in `claim`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.slot_done.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
