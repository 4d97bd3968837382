use std::collections::HashMap;

/// One-shot suppression set for server echoes of our own commands.
///
/// Each registration swallows exactly one future occurrence of the line.
/// Registering the same line twice swallows two occurrences.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    pending: HashMap<String, usize>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_once(&mut self, line: impl Into<String>) {
        *self.pending.entry(line.into()).or_insert(0) += 1;
    }

    /// Consume one registration of `line`. Returns whether one was present.
    pub fn take_if_present(&mut self, line: &str) -> bool {
        let Some(count) = self.pending.get_mut(line) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.pending.remove(line);
        }
        true
    }

    /// Number of outstanding registrations.
    pub fn len(&self) -> usize {
        self.pending.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_consumed_once() {
        let mut filters = FilterRegistry::new();
        filters.register_once("Style 12 set.");

        assert!(filters.take_if_present("Style 12 set."));
        assert!(!filters.take_if_present("Style 12 set."));
        assert!(filters.is_empty());
    }

    #[test]
    fn test_duplicate_registrations_stack() {
        let mut filters = FilterRegistry::new();
        filters.register_once("Bell off.");
        filters.register_once("Bell off.");
        assert_eq!(filters.len(), 2);

        assert!(filters.take_if_present("Bell off."));
        assert!(filters.take_if_present("Bell off."));
        assert!(!filters.take_if_present("Bell off."));
    }

    #[test]
    fn test_match_is_exact() {
        let mut filters = FilterRegistry::new();
        filters.register_once("ms set.");

        assert!(!filters.take_if_present("ms set"));
        assert!(!filters.take_if_present(" ms set."));
        assert_eq!(filters.len(), 1);
    }
}
