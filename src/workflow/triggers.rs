//! Heuristic workflow trigger classification.
//!
//! Decides from raw workflow YAML whether a workflow fires on pull requests
//! to a given branch, or on release publication. Regex heuristics over the
//! text, not a YAML parse: the answers feed "should we keep waiting?"
//! decisions, so false positives (waiting a little longer) are cheap and
//! false negatives (giving up on a real signal) are not. Anything
//! unparseable therefore classifies as triggered.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

// Block form:
//   on:
//     pull_request:
// with any other indented trigger blocks in between.
static PR_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^on:[ \t]*\r?\n(?:[ \t]*\r?\n|[ \t]+.*\r?\n)*?([ \t]+)pull_request\s*:")
        .expect("static pattern")
});

// Flow form: `on: [push, pull_request]`
static PR_FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^on:\s*\[[^\]]*\bpull_request\b[^\]]*\]").expect("static pattern")
});

// Scalar form: `on: pull_request`
static PR_SCALAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^on:\s*pull_request\s*$").expect("static pattern"));

static RELEASE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^on:[ \t]*\r?\n(?:[ \t]*\r?\n|[ \t]+.*\r?\n)*?[ \t]+release\s*:")
        .expect("static pattern")
});

static RELEASE_FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^on:\s*\[[^\]]*\brelease\b[^\]]*\]").expect("static pattern")
});

static RELEASE_SCALAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^on:\s*release\s*$").expect("static pattern"));

// Tag-push form: a push trigger with a tags filter.
static PUSH_TAGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\bon:.*?\bpush\s*:.*?\btags\s*:").expect("static pattern")
});

static BRANCHES_FLOW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"branches:\s*\[([^\]]*)\]").expect("static pattern"));

static BRANCHES_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"branches:\s*\r?\n((?:[ \t]*-[ \t]*.+\r?\n?)+)").expect("static pattern")
});

static TAGS_FLOW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tags:\s*\[([^\]]*)\]").expect("static pattern"));

static TAGS_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"tags:\s*\r?\n((?:[ \t]*-[ \t]*.+\r?\n?)+)").expect("static pattern")
});

fn strip_quotes(item: &str) -> &str {
    let item = item.trim();
    item.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| item.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(item)
}

fn list_items(flow: &Regex, block: &Regex, content: &str) -> Option<Vec<String>> {
    if let Some(caps) = flow.captures(content) {
        return Some(
            caps[1]
                .split(',')
                .map(|item| strip_quotes(item).to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        );
    }
    if let Some(caps) = block.captures(content) {
        return Some(
            caps[1]
                .lines()
                .filter_map(|line| line.trim().strip_prefix('-'))
                .map(|item| strip_quotes(item).to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        );
    }
    None
}

/// True when `item` admits every branch. A bare `*` or `**`, or any
/// pattern containing `**`, is a catch-all; a scoped glob like
/// `feature/*` is not.
fn is_catch_all(item: &str) -> bool {
    item == "*" || item.contains("**")
}

fn branch_filter_matches(items: &[String], target_branch: &str) -> bool {
    items
        .iter()
        .any(|item| item == target_branch || is_catch_all(item))
}

/// The body of a block-form trigger: everything after the key's line up to
/// the next line indented at or above the key itself.
fn trigger_body<'a>(content: &'a str, after: usize, key_indent: &str) -> &'a str {
    let tail = &content[after..];
    let mut end = tail.len();
    let mut offset = 0;
    for line in tail.split_inclusive('\n') {
        let lead = line.len() - line.trim_start().len();
        if !line.trim().is_empty() && lead <= key_indent.len() {
            end = offset;
            break;
        }
        offset += line.len();
    }
    &tail[..end]
}

/// Does this workflow fire on pull requests targeting `target_branch`?
pub fn triggered_by_pull_request(content: &str, target_branch: &str, workflow_name: &str) -> bool {
    // Branch filters live inside the pull_request block; scoping the search
    // there avoids picking up filters that belong to another trigger. The
    // flow and scalar forms carry no filters at all.
    let section = if let Some(caps) = PR_BLOCK_RE.captures(content) {
        let whole = caps.get(0).expect("whole match");
        trigger_body(content, whole.end(), &caps[1])
    } else if PR_FLOW_RE.is_match(content) || PR_SCALAR_RE.is_match(content) {
        ""
    } else {
        debug!("Workflow '{workflow_name}' has no pull_request trigger");
        return false;
    };
    match list_items(&BRANCHES_FLOW_RE, &BRANCHES_BLOCK_RE, section) {
        Some(items) => {
            let matches = branch_filter_matches(&items, target_branch);
            debug!(
                "Workflow '{workflow_name}' pull_request branches {items:?} vs '{target_branch}': {matches}"
            );
            matches
        }
        None => {
            debug!("Workflow '{workflow_name}' triggers on pull requests to any branch");
            true
        }
    }
}

/// Does this workflow fire when a release is published (or a release-style
/// tag is pushed)?
pub fn triggered_by_release(content: &str, workflow_name: &str) -> bool {
    if RELEASE_BLOCK_RE.is_match(content)
        || RELEASE_FLOW_RE.is_match(content)
        || RELEASE_SCALAR_RE.is_match(content)
    {
        debug!("Workflow '{workflow_name}' has a release trigger");
        return true;
    }

    if let Some(m) = PUSH_TAGS_RE.find(content) {
        let section = &content[m.start()..];
        let release_like = match list_items(&TAGS_FLOW_RE, &TAGS_BLOCK_RE, section) {
            Some(items) => items.iter().any(|item| {
                item.starts_with('v') || item.contains("release") || item.contains("tag")
            }),
            // Tags filter present but in a shape we don't parse.
            None => true,
        };
        debug!("Workflow '{workflow_name}' tag-push trigger looks release-like: {release_like}");
        return release_like;
    }

    debug!("Workflow '{workflow_name}' has no release trigger");
    false
}
