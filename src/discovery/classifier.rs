use std::collections::HashSet;

use tracing::{debug, warn};

use crate::browser::driver::{NodeHandle, Page};
use crate::discovery::element_model::{
    BUTTON_SELECTOR, ElementIdentifier, ElementType, FORM_BUTTON_SELECTOR, FORM_SELECTOR,
    INPUT_SELECTOR, IdentifierKind, NAV_LINK_SELECTOR, TestableElement, filter_attributes,
};
use crate::error::DriverResult;
use crate::selector::unique::{generate_unique_selector, selector_or_fallback};

/// Elements found on a page plus the number of nodes that could not be read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub elements: Vec<TestableElement>,
    pub error_count: usize,
}

/// Run the four scans in order: forms, buttons, navigation links, inputs.
pub async fn classify_page(page: &dyn Page) -> Classification {
    let mut out = Classification::default();
    let none = HashSet::new();

    scan(page, FORM_SELECTOR, ElementType::Form, &none, &mut out).await;

    // Buttons inside a form are reported through the form entry
    let in_forms: HashSet<String> = match page.query(FORM_BUTTON_SELECTOR).await {
        Ok(nodes) => nodes.into_iter().map(|n| n.id).collect(),
        Err(e) => {
            warn!(error = %e, "could not resolve form-owned buttons");
            out.error_count += 1;
            HashSet::new()
        }
    };
    scan(page, BUTTON_SELECTOR, ElementType::Button, &in_forms, &mut out).await;
    scan(page, NAV_LINK_SELECTOR, ElementType::NavigationLink, &none, &mut out).await;
    scan(page, INPUT_SELECTOR, ElementType::Input, &none, &mut out).await;

    debug!(
        elements = out.elements.len(),
        errors = out.error_count,
        "page classified"
    );
    out
}

async fn scan(
    page: &dyn Page,
    selector: &str,
    category: ElementType,
    exclude: &HashSet<String>,
    out: &mut Classification,
) {
    let nodes = match page.query(selector).await {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!(selector, error = %e, "scan query failed");
            out.error_count += 1;
            return;
        }
    };

    for node in nodes.iter().filter(|n| !exclude.contains(&n.id)) {
        let element = match category {
            ElementType::Form => scan_form(page, node).await,
            ElementType::Button => scan_button(page, node).await,
            ElementType::NavigationLink | ElementType::Input => {
                build_element(page, node, category).await.map(Some)
            }
        };
        match element {
            Ok(Some(el)) => out.elements.push(el),
            Ok(None) => {}
            Err(e) => {
                warn!(node = %node.id, tag = %node.tag, error = %e, "skipping unreadable node");
                out.error_count += 1;
            }
        }
    }
}

/// Forms without a render box are skipped.
async fn scan_form(page: &dyn Page, node: &NodeHandle) -> DriverResult<Option<TestableElement>> {
    let rendered = page.bounding_box(node).await?;
    if !rendered.is_some_and(|b| !b.is_empty()) {
        return Ok(None);
    }

    let mut element = build_element(page, node, ElementType::Form).await?;
    let mut children = Vec::new();
    for field in page.query_within(node, INPUT_SELECTOR).await? {
        children.push(selector_or_fallback(page, &field).await.0);
    }
    element.child_elements = Some(children);
    Ok(Some(element))
}

/// Buttons need a non-empty box and driver-reported visibility.
async fn scan_button(page: &dyn Page, node: &NodeHandle) -> DriverResult<Option<TestableElement>> {
    let rendered = page.bounding_box(node).await?;
    if !rendered.is_some_and(|b| !b.is_empty()) || !page.is_visible(node).await? {
        return Ok(None);
    }
    build_element(page, node, ElementType::Button).await.map(Some)
}

/// Read the facts common to every category.
pub async fn build_element(
    page: &dyn Page,
    node: &NodeHandle,
    element_type: ElementType,
) -> DriverResult<TestableElement> {
    let (value, degraded_selector, kind) = match generate_unique_selector(page, node).await {
        Ok(s) if s.value.starts_with('#') => (s.value, false, IdentifierKind::Id),
        Ok(s) => (s.value, false, IdentifierKind::Class),
        Err(d) => (d.tag, true, IdentifierKind::Class),
    };

    let location = page.bounding_box(node).await?.unwrap_or_default();
    let attributes = filter_attributes(page.attributes(node).await?);
    let inner_text = page
        .node_text(node)
        .await?
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(TestableElement {
        element_type,
        identifier: ElementIdentifier { kind, value },
        degraded_selector,
        attributes,
        inner_text,
        location,
        child_elements: None,
    })
}
