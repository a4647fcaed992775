//! Core SampleProcessor trait and the ordered processor chain.
//!
//! The [`SampleProcessor`] trait is the seam between the mixing engine and
//! DSP algorithms. Processors operate in place on blocks of interleaved f32
//! frames; the engine guarantees single-threaded access, so implementations
//! need no internal synchronization.
//!
//! ## Design Decisions
//!
//! - **Interleaved blocks**: one `&mut [f32]` per call, `frames × channels`
//!   samples. Mixing, per-source effects, and the master bus all share this
//!   layout, so processors compose without conversion.
//!
//! - **Object-safe**: chains hold `Box<dyn SampleProcessor + Send>` for
//!   runtime composition.
//!
//! - **No allocations**: `process` is called on the audio thread; processors
//!   allocate in their constructors, never per block.

/// In-place block processor over interleaved f32 frames.
///
/// # Example
///
/// ```rust
/// use mezcla_core::SampleProcessor;
///
/// struct Invert;
///
/// impl SampleProcessor for Invert {
///     fn process(&mut self, block: &mut [f32]) {
///         for sample in block.iter_mut() {
///             *sample = -*sample;
///         }
///     }
///
///     fn set_sample_rate(&mut self, _sample_rate: f32) {}
///
///     fn reset(&mut self) {}
/// }
/// ```
pub trait SampleProcessor {
    /// Process a block of interleaved samples in place.
    ///
    /// The block length is `frames * channels`; the engine never passes a
    /// partial frame.
    fn process(&mut self, block: &mut [f32]);

    /// Update the sample rate.
    ///
    /// Called when the processor is attached to a chain and whenever the
    /// engine rate changes. Implementations recalculate rate-dependent
    /// coefficients here.
    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Clear internal state (delay lines, filter history) without changing
    /// parameters.
    fn reset(&mut self);

    /// Whether the processor currently participates in its chain.
    ///
    /// A disabled processor is skipped by the chain, not reset; its state is
    /// preserved for re-enable. Default is always-on.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Ordered chain of boxed processors.
///
/// The chain runs each *enabled* member in order over the same block. It is
/// mutated by the application between callbacks only; the audio thread just
/// calls [`process`](ProcessorChain::process).
pub struct ProcessorChain {
    processors: Vec<Box<dyn SampleProcessor + Send>>,
    sample_rate: f32,
}

impl ProcessorChain {
    /// Create an empty chain at the given sample rate.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            processors: Vec::new(),
            sample_rate,
        }
    }

    /// Append a processor to the end of the chain.
    pub fn add(&mut self, mut processor: Box<dyn SampleProcessor + Send>) {
        processor.set_sample_rate(self.sample_rate);
        self.processors.push(processor);
    }

    /// Remove every processor from the chain.
    pub fn clear(&mut self) {
        self.processors.clear();
    }

    /// Number of processors in the chain (enabled or not).
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the chain holds no processors.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// The chain's sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Propagate a new sample rate to every member.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        for processor in &mut self.processors {
            processor.set_sample_rate(sample_rate);
        }
    }

    /// Reset every member, enabled or not.
    pub fn reset(&mut self) {
        for processor in &mut self.processors {
            processor.reset();
        }
    }

    /// Run each enabled member in order, in place.
    pub fn process(&mut self, block: &mut [f32]) {
        for processor in &mut self.processors {
            if processor.is_enabled() {
                processor.process(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scale {
        factor: f32,
        enabled: bool,
    }

    impl SampleProcessor for Scale {
        fn process(&mut self, block: &mut [f32]) {
            for sample in block.iter_mut() {
                *sample *= self.factor;
            }
        }
        fn set_sample_rate(&mut self, _: f32) {}
        fn reset(&mut self) {}
        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    #[test]
    fn empty_chain_is_identity() {
        let mut chain = ProcessorChain::new(48000.0);
        let mut block = [0.25, -0.5, 1.0];
        chain.process(&mut block);
        assert_eq!(block, [0.25, -0.5, 1.0]);
    }

    #[test]
    fn chain_runs_in_order() {
        let mut chain = ProcessorChain::new(48000.0);
        chain.add(Box::new(Scale {
            factor: 2.0,
            enabled: true,
        }));
        chain.add(Box::new(Scale {
            factor: 3.0,
            enabled: true,
        }));

        let mut block = [1.0, -1.0];
        chain.process(&mut block);
        assert_eq!(block, [6.0, -6.0]);
    }

    #[test]
    fn disabled_member_is_skipped() {
        let mut chain = ProcessorChain::new(48000.0);
        chain.add(Box::new(Scale {
            factor: 2.0,
            enabled: true,
        }));
        chain.add(Box::new(Scale {
            factor: 100.0,
            enabled: false,
        }));

        let mut block = [1.0];
        chain.process(&mut block);
        assert_eq!(block, [2.0]);
        assert_eq!(chain.len(), 2);
    }
}
