/// Hidden-comment statistics for one page instance.
///
/// Each filter engine owns the canonical value for its page and reports it
/// to the coordinator after every scan. The coordinator keeps the most
/// recently reported value without aggregating across pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub hidden_comments: usize,
}

impl FilterStats {
    pub fn new(hidden_comments: usize) -> Self {
        Self { hidden_comments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(FilterStats::default().hidden_comments, 0);
    }
}
