pub mod diff;
pub mod impact;
pub mod map;
pub mod symbols;

use std::sync::OnceLock;

use regex::Regex;

/// Pattern identifying test artifacts by file name. Every
/// reverse-reachability query filters these out unless the caller opts in.
const TEST_FILE_PATTERN: &str = r"\.(test|spec)\.|__test__|__tests__|\.stories\.";

static TEST_FILE_RE: OnceLock<Regex> = OnceLock::new();

pub fn is_test_file(path: &str) -> bool {
    TEST_FILE_RE
        .get_or_init(|| Regex::new(TEST_FILE_PATTERN).expect("invalid test-file pattern"))
        .is_match(path)
}
