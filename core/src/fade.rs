/// Linear gain ramp advanced in fixed steps, one step per engine period.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainFade {
    gain: f64,
    target: f64,
    increment: f64,
}

impl GainFade {
    pub fn new(gain: f64) -> Self {
        GainFade {
            gain,
            target: gain,
            increment: 0.0,
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn increment(&self) -> f64 {
        self.increment
    }

    pub fn is_fading(&self) -> bool {
        self.increment != 0.0
    }

    /// Starts a ramp from the current gain to `target` lasting `duration`
    /// seconds, stepped every `period` seconds.
    ///
    /// A non-positive duration (or period) jumps to the target immediately.
    pub fn fade(&mut self, target: f64, duration: f64, period: f64) {
        self.target = target;
        if duration <= 0.0 || period <= 0.0 {
            self.gain = target;
            self.increment = 0.0;
            return;
        }
        self.increment = (target - self.gain) / (duration / period);
    }

    /// Applies one increment and returns the new gain.
    pub fn step(&mut self) -> f64 {
        let gain = self.gain + self.increment;
        if (self.increment > 0.0 && gain >= self.target)
            || (self.increment < 0.0 && gain <= self.target)
        {
            self.gain = self.target;
            self.increment = 0.0;
        } else {
            self.gain = gain;
        }
        self.gain
    }
}
