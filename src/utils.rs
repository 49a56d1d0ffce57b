// Utility helpers

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Normalizes user supplied pagination into a `(page, limit, offset)` triple.
pub fn page_window(page: Option<i32>, limit: Option<i32>) -> (i32, i32, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page as i64 - 1) * limit as i64;
    (page, limit, offset)
}

pub fn is_env_flag_enabled(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_defaults_to_first_page() {
        assert_eq!(page_window(None, None), (1, DEFAULT_PAGE_SIZE, 0));
    }

    #[test]
    fn page_window_clamps_limit_and_page() {
        assert_eq!(page_window(Some(0), Some(1000)), (1, MAX_PAGE_SIZE, 0));
        assert_eq!(page_window(Some(3), Some(10)), (3, 10, 20));
    }
}
