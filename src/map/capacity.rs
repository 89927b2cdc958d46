use std::sync::atomic::{AtomicBool, Ordering};

/// Fixed pools that can run dry during a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapacityClass {
    Heap,
    ExcessList,
    RenderingBlocks,
    Triangles,
}

impl CapacityClass {
    pub const ALL: [CapacityClass; 4] = [
        CapacityClass::Heap,
        CapacityClass::ExcessList,
        CapacityClass::RenderingBlocks,
        CapacityClass::Triangles,
    ];

    fn index(self) -> usize {
        match self {
            CapacityClass::Heap => 0,
            CapacityClass::ExcessList => 1,
            CapacityClass::RenderingBlocks => 2,
            CapacityClass::Triangles => 3,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            CapacityClass::Heap => "voxel block heap",
            CapacityClass::ExcessList => "hash excess list",
            CapacityClass::RenderingBlocks => "rendering block list",
            CapacityClass::Triangles => "triangle buffer",
        }
    }
}

/// Warn once per class until the next reset, then drop to debug level
#[derive(Default)]
pub struct CapacityWarnings {
    fired: [AtomicBool; 4],
}

impl CapacityWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, class: CapacityClass, dropped: usize) {
        if dropped == 0 {
            return;
        }
        let first = !self.fired[class.index()].swap(true, Ordering::AcqRel);
        if first {
            log::warn!(
                "{} exhausted: {} item(s) dropped this pass; further overflows logged at debug level",
                class.describe(),
                dropped
            );
        } else {
            log::debug!("{} exhausted: {} item(s) dropped", class.describe(), dropped);
        }
    }

    pub fn has_fired(&self, class: CapacityClass) -> bool {
        self.fired[class.index()].load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        for flag in &self.fired {
            flag.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_class() {
        let warnings = CapacityWarnings::new();
        warnings.report(CapacityClass::Heap, 0);
        assert!(!warnings.has_fired(CapacityClass::Heap));

        warnings.report(CapacityClass::Heap, 3);
        warnings.report(CapacityClass::Heap, 1);
        assert!(warnings.has_fired(CapacityClass::Heap));
        assert!(!warnings.has_fired(CapacityClass::Triangles));

        warnings.reset();
        assert!(CapacityClass::ALL.iter().all(|&c| !warnings.has_fired(c)));
    }
}
