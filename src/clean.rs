use dom_query::{NodeRef, Selection};

use crate::profile::SiteProfile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Noise elements removed because a noise selector matched.
    pub noise: usize,
    /// Elements removed because they carried no visible text.
    pub empty: usize,
}

impl CleanReport {
    pub fn removed(&self) -> usize {
        self.noise + self.empty
    }
}

/// Remove noise from the content container in place.
///
/// The removal set is collected in one walk and only then detached. A node
/// that matches a noise selector is taken whole and its subtree is not
/// visited; an empty candidate is judged by the text that survives the
/// removal, so running the cleaner twice removes nothing the second time.
pub fn clean(root: &Selection, profile: &SiteProfile) -> CleanReport {
    let Some(root_node) = root.nodes().first() else {
        return CleanReport::default();
    };

    let mut doomed = Vec::new();
    let mut report = CleanReport::default();
    for child in root_node.children() {
        collect(&child, profile, &mut doomed, &mut report);
    }

    for node in doomed {
        Selection::from(node).remove();
    }

    report
}

fn collect<'a>(
    node: &NodeRef<'a>,
    profile: &SiteProfile,
    doomed: &mut Vec<NodeRef<'a>>,
    report: &mut CleanReport,
) {
    if !node.is_element() {
        return;
    }

    if is_noise(node, profile) {
        report.noise += 1;
        doomed.push(node.clone());
        return;
    }

    if is_empty_candidate(node, profile) && !has_visible_content(node, profile) {
        report.empty += 1;
        doomed.push(node.clone());
        return;
    }

    for child in node.children() {
        collect(&child, profile, doomed, report);
    }
}

fn is_noise(node: &NodeRef, profile: &SiteProfile) -> bool {
    profile.noise.iter().any(|selector| selector.matches(node))
}

fn is_empty_candidate(node: &NodeRef, profile: &SiteProfile) -> bool {
    let Some(name) = node.node_name() else {
        return false;
    };
    profile
        .empty_candidates
        .iter()
        .any(|tag| name.eq_ignore_ascii_case(tag))
}

/// Non-whitespace text or an image anywhere below `node`, ignoring subtrees
/// that are noise themselves.
fn has_visible_content(node: &NodeRef, profile: &SiteProfile) -> bool {
    for child in node.children() {
        if child.is_text() {
            if !child.text().trim().is_empty() {
                return true;
            }
            continue;
        }
        if !child.is_element() || is_noise(&child, profile) {
            continue;
        }
        if child
            .node_name()
            .is_some_and(|name| matches!(name.to_ascii_lowercase().as_str(), "img" | "svg" | "hr"))
        {
            return true;
        }
        if has_visible_content(&child, profile) {
            return true;
        }
    }
    false
}
