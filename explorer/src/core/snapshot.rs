//! Interactive-element extraction from a uiautomator hierarchy dump.
//!
//! Two passes (clickable, then focusable) feed one shared pool, so the
//! proximity check also de-duplicates across passes. Blacklisted uids are
//! dropped only after both passes, which means a blacklisted element can still
//! suppress a near-duplicate of itself.

use std::collections::HashSet;

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{Bounds, Capability, ElementList, RoleTag, UiElement};

/// Content descriptions shorter than this are folded into the uid.
const SHORT_DESC_CHARS: usize = 20;

const SEARCH_KEYWORDS: &[&str] = &[
    "search",
    "query",
    "find",
    "search_box",
    "search_bar",
    "edit_query",
    "search_src_text",
    "search_plate",
];

const NAV_KEYWORDS: &[&str] = &[
    "nav",
    "navigation",
    "navbar",
    "tab",
    "action_bar",
    "bottom_nav",
    "toolbar",
];

/// Snapshot tuning shared by every pass in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Elements whose centers are closer than this (Manhattan) to a pooled
    /// element are discarded.
    pub min_dist: i32,
    /// Append `.` + the node's `index` attribute to each uid.
    pub add_index: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            min_dist: 30,
            add_index: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("parse ui hierarchy: {0}")]
    Document(#[from] roxmltree::Error),
}

/// Semantic hint derived from a node's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleHint {
    SearchBar,
    NavItem,
    NavBarContainer,
}

impl RoleHint {
    fn tag(self) -> RoleTag {
        match self {
            RoleHint::SearchBar => RoleTag::SearchBar,
            RoleHint::NavItem => RoleTag::NavItem,
            RoleHint::NavBarContainer => RoleTag::NavBarContainer,
        }
    }
}

/// Run both capability passes over `xml` and drop blacklisted uids.
pub fn build_element_list(
    xml: &str,
    config: &SnapshotConfig,
    blacklist: &HashSet<String>,
) -> Result<ElementList, SnapshotError> {
    let doc = Document::parse(xml)?;
    let mut pool = Vec::new();
    collect_from_document(&doc, Capability::Clickable, &mut pool, config);
    collect_from_document(&doc, Capability::Focusable, &mut pool, config);
    let before = pool.len();
    pool.retain(|element| !blacklist.contains(&element.uid));
    debug!(
        collected = before,
        kept = pool.len(),
        "built element list"
    );
    Ok(ElementList::new(pool))
}

/// Append every node carrying `capability="true"` to `pool`, in document order.
///
/// Returns how many elements were added.
pub fn collect_elements(
    xml: &str,
    capability: Capability,
    pool: &mut Vec<UiElement>,
    config: &SnapshotConfig,
) -> Result<usize, SnapshotError> {
    let doc = Document::parse(xml)?;
    Ok(collect_from_document(&doc, capability, pool, config))
}

fn collect_from_document(
    doc: &Document<'_>,
    capability: Capability,
    pool: &mut Vec<UiElement>,
    config: &SnapshotConfig,
) -> usize {
    let start = pool.len();
    for node in doc.descendants().filter(Node::is_element) {
        if node.attribute(capability.attribute()) != Some("true") {
            continue;
        }
        let Some(raw_bounds) = node.attribute("bounds") else {
            debug!(class = ?node.attribute("class"), "node without bounds skipped");
            continue;
        };
        let bounds = match Bounds::parse(raw_bounds) {
            Some(bounds) if !bounds.is_degenerate() => bounds,
            _ => {
                warn!(bounds = raw_bounds, class = ?node.attribute("class"), "unusable bounds, node skipped");
                continue;
            }
        };

        let center = bounds.center();
        if pool
            .iter()
            .any(|existing| existing.center().manhattan(&center) < config.min_dist)
        {
            continue;
        }

        let parent = node.parent_element();
        let mut uid = match parent {
            Some(parent) => format!("{}.{}", raw_id(&parent), raw_id(&node)),
            None => raw_id(&node),
        };
        if config.add_index {
            uid.push('.');
            uid.push_str(node.attribute("index").unwrap_or("0"));
        }

        let mut tags = vec![capability.tag()];
        if let Some(hint) = role_hint(&node) {
            tags.push(hint.tag());
        }
        if parent.is_some_and(|p| role_hint(&p) == Some(RoleHint::NavBarContainer))
            && !tags.contains(&RoleTag::NavItem)
        {
            tags.push(RoleTag::NavItem);
        }

        pool.push(UiElement { uid, bounds, tags });
    }
    pool.len() - start
}

/// Identifier of a node without its parent prefix.
fn raw_id(node: &Node<'_, '_>) -> String {
    let mut id = match node.attribute("resource-id").filter(|id| !id.is_empty()) {
        Some(resource_id) => resource_id.replace('/', "_").replace(':', "."),
        None => {
            let (width, height) = node
                .attribute("bounds")
                .and_then(Bounds::parse)
                .map(|b| (b.width(), b.height()))
                .unwrap_or((0, 0));
            let class = node.attribute("class").unwrap_or("UnknownClass");
            format!("{class}_{width}_{height}")
        }
    };
    if let Some(desc) = node.attribute("content-desc").filter(|d| !d.is_empty())
        && desc.chars().count() < SHORT_DESC_CHARS
    {
        id.push('_');
        id.push_str(&desc.replace(' ', "").replace('/', "_"));
    }
    id
}

fn role_hint(node: &Node<'_, '_>) -> Option<RoleHint> {
    let attr = |name: &str| node.attribute(name).unwrap_or("").to_lowercase();
    let res_id = attr("resource-id");
    let desc = attr("content-desc");
    let text = attr("text");
    let class = attr("class");

    let mentions = |keywords: &[&str]| {
        [&res_id, &desc, &text]
            .iter()
            .any(|field| keywords.iter().any(|kw| field.contains(kw)))
    };

    let combined = format!("{text}{res_id}{desc}");
    let is_search = mentions(SEARCH_KEYWORDS)
        || (class.contains("edittext") && (combined.contains("search") || combined.contains("query")))
        || class.contains("searchview");
    if is_search {
        return Some(RoleHint::SearchBar);
    }

    let is_nav = mentions(NAV_KEYWORDS)
        || class.contains("tabwidget")
        || class.contains("bottomnavigationview")
        || (class.contains("toolbar") && !res_id.contains("action_bar"));
    if !is_nav {
        return None;
    }
    if node.attribute("clickable") == Some("true") {
        Some(RoleHint::NavItem)
    } else {
        Some(RoleHint::NavBarContainer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy(body: &str) -> String {
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><hierarchy rotation="0">{body}</hierarchy>"#)
    }

    fn uids(list: &ElementList) -> Vec<&str> {
        list.iter().map(|e| e.uid.as_str()).collect()
    }

    #[test]
    fn uid_uses_resource_id_and_short_description() {
        let xml = hierarchy(
            r#"<node index="0" class="android.widget.FrameLayout" resource-id="com.app:id/root" bounds="[0,0][1080,1920]">
                 <node index="2" class="android.widget.Button" resource-id="com.app:id/ok" content-desc="Sign in" clickable="true" bounds="[100,100][300,200]"/>
               </node>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert_eq!(uids(&list), vec!["com.app.id_root.com.app.id_ok_Signin"]);
    }

    #[test]
    fn uid_falls_back_to_class_and_size() {
        let xml = hierarchy(
            r#"<node class="android.widget.LinearLayout" bounds="[0,0][1080,1920]">
                 <node index="3" class="android.widget.ImageView" clickable="true" bounds="[10,20][110,70]"/>
               </node>"#,
        );
        let config = SnapshotConfig {
            add_index: true,
            ..SnapshotConfig::default()
        };
        let list = build_element_list(&xml, &config, &HashSet::new()).expect("parse");
        assert_eq!(
            uids(&list),
            vec!["android.widget.LinearLayout_1080_1920.android.widget.ImageView_100_50.3"]
        );
    }

    #[test]
    fn long_descriptions_are_not_folded_into_uid() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/x" content-desc="a description well over twenty chars" clickable="true" bounds="[0,0][50,50]"/>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert_eq!(uids(&list), vec!["UnknownClass_0_0.a.id_x"]);
    }

    #[test]
    fn degenerate_and_malformed_bounds_are_skipped() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/flat" clickable="true" bounds="[0,0][100,0]"/>
               <node resource-id="a:id/bad" clickable="true" bounds="[0,0][oops]"/>
               <node resource-id="a:id/ok" clickable="true" bounds="[0,200][100,300]"/>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert_eq!(list.len(), 1);
        assert!(list.iter().all(|e| e.uid.ends_with("a.id_ok")));
    }

    #[test]
    fn overflowing_bounds_are_skipped() {
        let xml = hierarchy(
            r#"<node class="android.widget.FrameLayout" bounds="[1500000000,0][2000000000,10]">
                 <node class="android.widget.Button" clickable="true" bounds="[1500000000,0][2000000000,10]"/>
                 <node class="android.widget.Button" clickable="true" bounds="[0,0][100,100]"/>
               </node>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert_eq!(
            uids(&list),
            vec!["android.widget.FrameLayout_0_0.android.widget.Button_100_100"]
        );
    }

    #[test]
    fn near_duplicates_are_removed_across_passes() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/btn" clickable="true" bounds="[0,0][100,100]"/>
               <node resource-id="a:id/btn_focus" focusable="true" bounds="[5,5][105,105]"/>
               <node resource-id="a:id/far" focusable="true" bounds="[500,500][600,600]"/>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert_eq!(list.len(), 2);
        let centers: Vec<_> = list.iter().map(UiElement::center).collect();
        for (i, a) in centers.iter().enumerate() {
            for b in &centers[i + 1..] {
                assert!(a.manhattan(b) >= 30);
            }
        }
        assert_eq!(list.resolve(1).map(|e| e.tags[0]), Some(RoleTag::Clickable));
        assert_eq!(list.resolve(2).map(|e| e.tags[0]), Some(RoleTag::Focusable));
    }

    #[test]
    fn search_hint_wins_over_navigation() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/toolbar_search" clickable="true" bounds="[0,0][100,100]"/>
               <node class="android.widget.EditText" text="Query here" focusable="true" bounds="[0,300][100,400]"/>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert!(list.iter().all(|e| e.has_tag(RoleTag::SearchBar)));
    }

    #[test]
    fn nav_container_children_become_nav_items() {
        let xml = hierarchy(
            r#"<node class="com.google.android.material.bottomnavigation.BottomNavigationView" focusable="true" bounds="[0,1700][1080,1920]">
                 <node class="android.widget.FrameLayout" content-desc="Home" clickable="true" bounds="[0,1720][270,1900]"/>
               </node>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        let home = list
            .iter()
            .find(|e| e.uid.ends_with("_Home"))
            .expect("home element");
        assert!(home.has_tag(RoleTag::NavItem));
        let container = list
            .iter()
            .find(|e| e.has_tag(RoleTag::Focusable))
            .expect("container");
        assert!(container.has_tag(RoleTag::NavBarContainer));
    }

    #[test]
    fn toolbar_class_and_action_bar_id_both_classify_as_navigation() {
        let xml = hierarchy(
            r#"<node class="android.widget.Toolbar" resource-id="a:id/bar" clickable="true" bounds="[0,0][100,100]"/>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert!(list.iter().all(|e| e.has_tag(RoleTag::NavItem)));

        let xml = hierarchy(
            r#"<node class="android.widget.Toolbar" resource-id="a:id/action_bar" clickable="true" bounds="[0,0][100,100]"/>"#,
        );
        let list = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        // "action_bar" is itself a nav keyword, so the id still classifies.
        assert!(list.iter().all(|e| e.has_tag(RoleTag::NavItem)));
    }

    #[test]
    fn blacklisted_uids_are_dropped() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/one" clickable="true" bounds="[0,0][100,100]"/>
               <node resource-id="a:id/two" clickable="true" bounds="[0,300][100,400]"/>"#,
        );
        let blacklist: HashSet<String> = ["UnknownClass_0_0.a.id_one".to_string()].into();
        let list = build_element_list(&xml, &SnapshotConfig::default(), &blacklist).expect("parse");
        assert_eq!(uids(&list), vec!["UnknownClass_0_0.a.id_two"]);
    }

    #[test]
    fn labels_are_stable_for_identical_documents() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/one" clickable="true" bounds="[0,0][100,100]"/>
               <node resource-id="a:id/two" focusable="true" bounds="[0,300][100,400]"/>"#,
        );
        let first = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        let second = build_element_list(&xml, &SnapshotConfig::default(), &HashSet::new())
            .expect("parse");
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = build_element_list("<hierarchy><node>", &SnapshotConfig::default(), &HashSet::new())
            .expect_err("should fail");
        assert!(matches!(err, SnapshotError::Document(_)));
    }

    #[test]
    fn collect_elements_reports_added_count() {
        let xml = hierarchy(
            r#"<node resource-id="a:id/one" clickable="true" bounds="[0,0][100,100]"/>"#,
        );
        let mut pool = Vec::new();
        let config = SnapshotConfig::default();
        let added = collect_elements(&xml, Capability::Clickable, &mut pool, &config).expect("parse");
        assert_eq!(added, 1);
        let again = collect_elements(&xml, Capability::Clickable, &mut pool, &config).expect("parse");
        assert_eq!(again, 0);
    }
}
