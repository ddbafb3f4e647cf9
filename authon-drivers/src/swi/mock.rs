//! Scripted line and clock for physical layer tests
//!
//! Time only advances through delays and pin samples. While the pin is
//! released the line follows a schedule of level changes; a queued device
//! response is armed each time the host releases the line after driving it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use authon_hal::{Clock, CriticalSection, Direction, Level, SwiPin};
use authon_protocol::timing::{pulses, Pulse, PulseWidths};
use authon_protocol::{WireWord, WordClass, WORD_BITS};

/// Cost of one pin sample
const SAMPLE_NS: u64 = 100;

/// Device turnaround before the first response edge
const TURNAROUND_NS: u64 = 20_000;

#[derive(Debug, Clone, Copy)]
enum Event {
    Drive(u64, Level),
    Release(u64),
}

impl Event {
    fn time(self) -> u64 {
        match self {
            Event::Drive(t, _) | Event::Release(t) => t,
        }
    }
}

struct State {
    now_ns: u64,
    direction: Direction,
    events: Vec<Event>,
    responses: VecDeque<Vec<(u64, Level)>>,
    schedule: Vec<(u64, Level)>,
    masked_ns: Vec<u64>,
}

impl State {
    fn line_level(&self) -> Level {
        self.schedule
            .iter()
            .rev()
            .find(|(t, _)| *t <= self.now_ns)
            .map(|(_, level)| *level)
            .unwrap_or(Level::High)
    }
}

/// Shared state behind a [`MockPin`] and a [`MockClock`]
#[derive(Clone)]
pub struct MockLine(Rc<RefCell<State>>);

impl MockLine {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(State {
            now_ns: 0,
            direction: Direction::Input,
            events: Vec::new(),
            responses: VecDeque::new(),
            schedule: Vec::new(),
            masked_ns: Vec::new(),
        })))
    }

    pub fn pin(&self) -> MockPin {
        MockPin(self.clone())
    }

    pub fn clock(&self) -> MockClock {
        MockClock(self.clone())
    }

    pub fn section(&self) -> MockSection {
        MockSection(self.clone())
    }

    /// Longest critical section entered through a [`MockSection`]
    pub fn longest_masked_ns(&self) -> u64 {
        self.0.borrow().masked_ns.iter().copied().max().unwrap_or(0)
    }

    pub fn direction(&self) -> Direction {
        self.0.borrow().direction
    }

    /// Queue ACK words carrying `bytes`
    pub fn respond(&self, bytes: &[u8], tau_us: u32, skew_ns: u64) {
        let words: Vec<_> = bytes
            .iter()
            .map(|&b| WireWord::new(WordClass::DataAck, b))
            .collect();
        self.respond_words(&words, tau_us, skew_ns);
    }

    /// Queue a response; every bit interval is stretched by `skew_ns`
    pub fn respond_words(&self, words: &[WireWord], tau_us: u32, skew_ns: u64) {
        let widths = PulseWidths::from_tau(tau_us);
        let mut segments = Vec::new();
        segments.push((TURNAROUND_NS, Level::High));
        for word in words {
            for (i, pulse) in pulses(word.encode(), widths).enumerate() {
                let skew = if i < WORD_BITS { skew_ns } else { 0 };
                segments.push((
                    pulse.width_us as u64 * 1_000 + skew,
                    Level::from_bool(pulse.high),
                ));
            }
        }
        self.0.borrow_mut().responses.push_back(segments);
    }

    /// Pull the line low for `width_us` after `delay_us`
    pub fn interrupt_after(&self, delay_us: u32, width_us: u32) {
        let mut state = self.0.borrow_mut();
        let start = state.now_ns + delay_us as u64 * 1_000;
        state.schedule = std::vec![
            (start, Level::Low),
            (start + width_us as u64 * 1_000, Level::High),
        ];
    }

    /// Pulses the host drove, zero-length ones dropped
    pub fn transmitted(&self) -> Vec<Pulse> {
        let state = self.0.borrow();
        let mut out = Vec::new();
        for (i, event) in state.events.iter().enumerate() {
            let Event::Drive(start, level) = *event else {
                continue;
            };
            let end = state
                .events
                .get(i + 1)
                .map(|e| e.time())
                .unwrap_or(state.now_ns);
            if end > start {
                out.push(Pulse {
                    high: level.is_high(),
                    width_us: ((end - start) / 1_000) as u32,
                });
            }
        }
        out
    }

    /// Widths of every low level the host drove, in microseconds
    pub fn low_holds(&self) -> Vec<u32> {
        self.transmitted()
            .into_iter()
            .filter(|p| !p.high)
            .map(|p| p.width_us)
            .collect()
    }
}

pub struct MockPin(MockLine);

impl SwiPin for MockPin {
    fn read_level(&mut self) -> Level {
        let mut state = self.0 .0.borrow_mut();
        state.now_ns += SAMPLE_NS;
        match state.direction {
            Direction::Output(_) => state
                .events
                .iter()
                .rev()
                .find_map(|e| match e {
                    Event::Drive(_, level) => Some(*level),
                    Event::Release(_) => None,
                })
                .unwrap_or(Level::High),
            Direction::Input => state.line_level(),
        }
    }

    fn write_level(&mut self, level: Level) {
        let mut state = self.0 .0.borrow_mut();
        if let Direction::Output(_) = state.direction {
            let now = state.now_ns;
            state.direction = Direction::Output(level);
            state.events.push(Event::Drive(now, level));
        }
    }

    fn set_direction(&mut self, direction: Direction) {
        let mut state = self.0 .0.borrow_mut();
        let now = state.now_ns;
        match direction {
            Direction::Output(level) => state.events.push(Event::Drive(now, level)),
            Direction::Input => {
                if let Direction::Output(_) = state.direction {
                    state.events.push(Event::Release(now));
                    if let Some(segments) = state.responses.pop_front() {
                        let mut t = now;
                        let mut schedule = Vec::new();
                        for (width, level) in segments {
                            schedule.push((t, level));
                            t += width;
                        }
                        schedule.push((t, Level::High));
                        state.schedule = schedule;
                    }
                }
            }
        }
        state.direction = direction;
    }
}

pub struct MockClock(MockLine);

impl Clock for MockClock {
    fn now_ns(&mut self) -> u64 {
        self.0 .0.borrow().now_ns
    }

    fn delay_us(&mut self, us: u32) {
        self.0 .0.borrow_mut().now_ns += us as u64 * 1_000;
    }
}

/// Critical section that records how long each one lasted
pub struct MockSection(MockLine);

impl CriticalSection for MockSection {
    fn with<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = self.0 .0.borrow().now_ns;
        let result = f();
        let mut state = self.0 .0.borrow_mut();
        let elapsed = state.now_ns - start;
        state.masked_ns.push(elapsed);
        result
    }
}
