use std::thread;
use std::time::Duration;

/// Observed level of a digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Direction of a trigger transition, also the frame's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Transition {
    Rising = 1,
    Falling = 2,
}

impl Transition {
    /// Wire value of this transition.
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Transition::Rising),
            2 => Some(Transition::Falling),
            _ => None,
        }
    }

    /// Level the line must sit at before the transition can happen.
    pub fn pre_level(self) -> Level {
        match self {
            Transition::Rising => Level::Low,
            Transition::Falling => Level::High,
        }
    }

    /// Level the line reaches once the transition happened.
    pub fn post_level(self) -> Level {
        match self {
            Transition::Rising => Level::High,
            Transition::Falling => Level::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Rising => "rising",
            Transition::Falling => "falling",
        }
    }
}

/// A digital input that can be read on demand.
pub trait LevelSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn level(&mut self) -> Result<Level, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
#[error("Trigger line read failed: {0}")]
pub struct LineError(#[source] Box<dyn std::error::Error + Send + Sync>);

/// Blocks until a genuine transition is observed on a digital line.
///
/// Waiting happens in two phases. The coarse phase sleeps between polls until
/// the line sits at the pre-transition level. The fine phase then spins, only
/// yielding the thread, until the post-transition level shows up. The fine
/// phase dominates edge latency.
#[derive(Debug)]
pub struct EdgeDetector<L> {
    line: L,
    coarse_poll: Duration,
    last_level: Option<Level>,
}

impl<L: LevelSource> EdgeDetector<L> {
    pub fn new(line: L, coarse_poll: Duration) -> Self {
        Self {
            line,
            coarse_poll,
            last_level: None,
        }
    }

    /// Wait, without timeout, for the given transition.
    ///
    /// Returns once the line was seen at the pre-transition level and, on a
    /// later poll, at the post-transition level.
    pub fn wait_for_edge(&mut self, transition: Transition) -> Result<(), LineError> {
        let pre = transition.pre_level();
        let post = transition.post_level();

        while self.sample()? != pre {
            thread::sleep(self.coarse_poll);
        }

        while self.sample()? != post {
            thread::yield_now();
        }

        log::trace!("Observed {} edge", transition.as_str());
        Ok(())
    }

    /// Most recent level seen by the detector.
    pub fn last_level(&self) -> Option<Level> {
        self.last_level
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn into_line(self) -> L {
        self.line
    }

    fn sample(&mut self) -> Result<Level, LineError> {
        let level = self
            .line
            .level()
            .map_err(|e| LineError(Box::new(e)))?;
        self.last_level = Some(level);
        Ok(level)
    }
}
