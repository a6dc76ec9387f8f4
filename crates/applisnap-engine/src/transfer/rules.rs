//! Ordered include/exclude rules, evaluated the way rsync filters are.
//!
//! - Rules are tried in order; the first matching rule decides.
//! - A path no rule matches gets the set's fallback.
//! - A leading `/` anchors the pattern at the transfer root. Unanchored
//!   patterns match any trailing run of whole path segments.
//! - A trailing `/` restricts the pattern to directories.
//! - `*` and `?` never cross a `/`; `**` does, and `**/` also matches no
//!   segment at all.
//!
//! `admits` additionally requires every ancestor directory to be admitted,
//! since rsync never descends into an excluded directory.

/// One filter rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Include(String),
    Exclude(String),
}

impl Rule {
    fn pattern(&self) -> &str {
        match self {
            Rule::Include(p) | Rule::Exclude(p) => p,
        }
    }

    fn includes(&self) -> bool {
        matches!(self, Rule::Include(_))
    }

    /// The rsync command-line form of this rule
    pub fn to_rsync_arg(&self) -> String {
        match self {
            Rule::Include(p) => format!("--include={}", p),
            Rule::Exclude(p) => format!("--exclude={}", p),
        }
    }

    /// Whether this rule's pattern matches `path` (relative, no leading `/`)
    pub fn matches(&self, path: &str, is_dir: bool) -> bool {
        let raw = self.pattern();
        let (raw, dir_only) = match raw.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };
        if dir_only && !is_dir {
            return false;
        }
        let (raw, anchored) = match raw.strip_prefix('/') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };

        let pattern: Vec<char> = raw.chars().collect();
        let path: Vec<char> = path.trim_matches('/').chars().collect();

        if glob(&pattern, &path) {
            return true;
        }
        if anchored {
            return false;
        }
        path.iter()
            .enumerate()
            .filter(|(_, c)| **c == '/')
            .any(|(i, _)| glob(&pattern, &path[i + 1..]))
    }
}

fn glob(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') if pattern.get(1) == Some(&'*') => {
            let rest = &pattern[2..];
            if rest.first() == Some(&'/') && glob(&rest[1..], text) {
                return true;
            }
            (0..=text.len()).any(|i| glob(rest, &text[i..]))
        }
        Some('*') => {
            let rest = &pattern[1..];
            for i in 0..=text.len() {
                if glob(rest, &text[i..]) {
                    return true;
                }
                if text.get(i) == Some(&'/') {
                    break;
                }
            }
            false
        }
        Some('?') => match text.first() {
            Some(c) if *c != '/' => glob(&pattern[1..], &text[1..]),
            _ => false,
        },
        Some(c) => text.first() == Some(c) && glob(&pattern[1..], &text[1..]),
    }
}

/// Ordered rules plus the decision for unmatched paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
    include_unmatched: bool,
}

impl RuleSet {
    /// Empty set that excludes anything not explicitly included
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            include_unmatched: false,
        }
    }

    /// Empty set that transfers everything not explicitly excluded
    pub fn all() -> Self {
        Self {
            rules: Vec::new(),
            include_unmatched: true,
        }
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(Rule::Include(pattern.into()));
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(Rule::Exclude(pattern.into()));
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First-match decision for a single path, ignoring its ancestors
    pub fn evaluate(&self, path: &str, is_dir: bool) -> bool {
        self.rules
            .iter()
            .find(|rule| rule.matches(path, is_dir))
            .map_or(self.include_unmatched, Rule::includes)
    }

    /// Whether a sync with these rules would transfer `path`
    pub fn admits(&self, path: &str, is_dir: bool) -> bool {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return true;
        }
        let ancestors_admitted = path
            .char_indices()
            .filter(|(_, c)| *c == '/')
            .all(|(i, _)| self.evaluate(&path[..i], true));
        ancestors_admitted && self.evaluate(path, is_dir)
    }

    /// `--include`/`--exclude` arguments, ending in `--exclude=*` when
    /// unmatched paths are excluded
    pub fn to_rsync_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.rules.iter().map(Rule::to_rsync_arg).collect();
        if !self.include_unmatched {
            args.push("--exclude=*".to_string());
        }
        args
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}
