use std::collections::BTreeMap;

use webtest_engine::browser::driver::{Browser, BrowserContext, Page};
use webtest_engine::browser::mock::{MockBrowser, MockDocument, MockElement};
use webtest_engine::discovery::crawler::{DiscoveryConfig, crawl_page, signature, validate_url};
use webtest_engine::discovery::element_model::{
    ElementType, IdentifierKind, MAX_ATTRIBUTE_LEN, filter_attributes,
};
use webtest_engine::discovery::classify_page;
use webtest_engine::error::EngineError;

const LOGIN_URL: &str = "https://app.test/login";

// =========================================================================
// Helpers
// =========================================================================

/// Visible login form (two fields and a submit) plus a hidden standalone button.
fn login_page() -> MockDocument {
    let mut doc = MockDocument::new("Sign in");
    let form = doc.push(MockElement::new("form").id("login-form").bbox(0.0, 0.0, 400.0, 300.0));
    doc.push(MockElement::new("input").id("email").attr("type", "email").child_of(form));
    doc.push(
        MockElement::new("input")
            .name("password")
            .attr("type", "password")
            .child_of(form),
    );
    doc.push(
        MockElement::new("input")
            .attr("type", "submit")
            .attr("value", "Sign in")
            .child_of(form),
    );
    doc.push(MockElement::new("button").id("help").text("Help").hidden());
    doc
}

fn count(elements: &[webtest_engine::discovery::TestableElement], kind: ElementType) -> usize {
    elements.iter().filter(|e| e.element_type == kind).count()
}

// =========================================================================
// Crawl scenarios
// =========================================================================

#[tokio::test]
async fn crawl_reports_form_with_children_and_skips_hidden_button() {
    let browser = MockBrowser::new().with_document(LOGIN_URL, login_page());

    let (result, stats) = crawl_page(&browser, LOGIN_URL, &DiscoveryConfig::default())
        .await
        .unwrap();

    assert_eq!(result.url, LOGIN_URL);
    assert_eq!(result.title, "Sign in");
    assert_eq!(count(&result.elements, ElementType::Form), 1);
    assert_eq!(count(&result.elements, ElementType::Button), 0);
    assert_eq!(count(&result.elements, ElementType::Input), 2);

    let form = &result.elements[0];
    assert_eq!(form.element_type, ElementType::Form);
    assert_eq!(form.identifier.value, "#login-form");
    assert_eq!(form.identifier.kind, IdentifierKind::Id);
    assert_eq!(
        form.child_elements.as_deref(),
        Some(&["#email".to_string(), "input[name=\"password\"]".to_string()][..])
    );

    assert_eq!(stats.elements_found, result.elements.len());
    assert_eq!(stats.error_count, 0);
    assert_eq!(stats.memory_usage.heap_used, 64 * 1024 * 1024);
    assert_eq!(result.signature, signature(&result.elements));
}

#[tokio::test]
async fn crawl_closes_page_and_context() {
    let browser = MockBrowser::new().with_document(LOGIN_URL, login_page());
    crawl_page(&browser, LOGIN_URL, &DiscoveryConfig::default())
        .await
        .unwrap();

    assert!(browser.was_called("load_state:DomContentLoaded"));
    assert_eq!(browser.count_calls("close_page"), 1);
    assert_eq!(browser.count_calls("close_context"), 1);
}

#[tokio::test]
async fn crawl_navigation_failure_still_closes_resources() {
    let browser = MockBrowser::new().with_unreachable("https://down.test/");
    let err = crawl_page(&browser, "https://down.test/", &DiscoveryConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Driver(_)));
    assert_eq!(browser.count_calls("close_page"), 1);
    assert_eq!(browser.count_calls("close_context"), 1);
}

#[tokio::test]
async fn invalid_url_fails_before_any_driver_call() {
    let browser = MockBrowser::new();
    for url in ["ftp://files.test/", "not a url", "https://", "app.test/login"] {
        let err = crawl_page(&browser, url, &DiscoveryConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUrl { .. }), "{}", url);
    }
    assert!(browser.calls().is_empty());
}

#[test]
fn validate_url_accepts_http_and_https() {
    assert!(validate_url("http://localhost:3000/").is_ok());
    assert!(validate_url("https://app.test/path?q=1").is_ok());
    assert!(validate_url("https://app.test").is_ok());
}

#[test]
fn validate_url_rejects_malformed_authority() {
    for url in ["http://host:99999/", "http://[::1/", "http://ho^st/", "mailto:someone@app.test"] {
        let err = validate_url(url).unwrap_err();
        assert!(matches!(err, EngineError::InvalidUrl { .. }), "{}", url);
    }
}

#[tokio::test]
async fn malformed_url_never_reaches_driver() {
    let browser = MockBrowser::new();
    let err = crawl_page(&browser, "http://ho^st/", &DiscoveryConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidUrl { .. }));
    assert!(browser.calls().is_empty());
}

// =========================================================================
// Classification details
// =========================================================================

#[tokio::test]
async fn classification_order_and_categories() {
    let mut doc = MockDocument::new("Home");
    let nav = doc.push(MockElement::new("nav"));
    doc.push(MockElement::new("a").attr("href", "/").text(" Home ").child_of(nav));
    doc.push(MockElement::new("a").class("btn cta").text("Start"));
    doc.push(MockElement::new("div").attr("role", "button").text("Menu").bbox(0.0, 0.0, 0.0, 0.0));
    doc.push(MockElement::new("textarea").name("feedback"));

    let browser = MockBrowser::new().with_document("https://home.test/", doc);
    let context = browser.new_context().await.unwrap();
    let page = context.new_page().await.unwrap();
    page.goto("https://home.test/").await.unwrap();

    let classification = classify_page(page.as_ref()).await;
    let kinds: Vec<ElementType> = classification
        .elements
        .iter()
        .map(|e| e.element_type)
        .collect();
    assert_eq!(
        kinds,
        vec![ElementType::Button, ElementType::NavigationLink, ElementType::Input]
    );

    let button = &classification.elements[0];
    assert_eq!(button.identifier.value, "a.btn.cta");
    assert_eq!(button.identifier.kind, IdentifierKind::Class);
    assert_eq!(button.inner_text.as_deref(), Some("Start"));

    let link = &classification.elements[1];
    assert_eq!(link.inner_text.as_deref(), Some("Home"));
    assert_eq!(link.attributes.get("href").map(String::as_str), Some("/"));

    assert_eq!(classification.elements[2].identifier.value, "textarea[name=\"feedback\"]");
    assert_eq!(classification.error_count, 0);
}

#[tokio::test]
async fn unreadable_node_degrades_selector() {
    let doc = MockDocument::new("Odd").with(MockElement::new("select").detached());
    let browser = MockBrowser::new().with_document("https://odd.test/", doc);
    let context = browser.new_context().await.unwrap();
    let page = context.new_page().await.unwrap();
    page.goto("https://odd.test/").await.unwrap();

    let classification = classify_page(page.as_ref()).await;
    assert_eq!(classification.elements.len(), 1);
    let input = &classification.elements[0];
    assert!(input.degraded_selector);
    assert_eq!(input.identifier.value, "select");
}

// =========================================================================
// Attribute filtering and signatures
// =========================================================================

#[test]
fn long_attribute_values_are_dropped() {
    let mut attributes = BTreeMap::new();
    attributes.insert("id".to_string(), "short".to_string());
    attributes.insert("data-blob".to_string(), "x".repeat(MAX_ATTRIBUTE_LEN + 1));
    attributes.insert("data-edge".to_string(), "y".repeat(MAX_ATTRIBUTE_LEN));

    let kept = filter_attributes(attributes);
    assert!(kept.contains_key("id"));
    assert!(kept.contains_key("data-edge"));
    assert!(!kept.contains_key("data-blob"));
}

#[tokio::test]
async fn signature_is_stable_across_crawls() {
    let browser = MockBrowser::new().with_document(LOGIN_URL, login_page());
    let (first, _) = crawl_page(&browser, LOGIN_URL, &DiscoveryConfig::default())
        .await
        .unwrap();
    let (second, _) = crawl_page(&browser, LOGIN_URL, &DiscoveryConfig::default())
        .await
        .unwrap();
    assert_eq!(first.signature, second.signature);
    assert_eq!(first.signature.len(), 40);
}

#[test]
fn crawl_result_serializes_with_type_field() {
    let element = webtest_engine::discovery::TestableElement {
        element_type: ElementType::NavigationLink,
        identifier: webtest_engine::discovery::element_model::ElementIdentifier {
            kind: IdentifierKind::Class,
            value: "a.nav".into(),
        },
        degraded_selector: false,
        attributes: BTreeMap::new(),
        inner_text: None,
        location: Default::default(),
        child_elements: None,
    };
    let json = serde_json::to_value(&element).unwrap();
    assert_eq!(json["type"], "navigationLink");
    assert_eq!(json["identifier"]["type"], "class");
    assert!(json.get("childElements").is_none());
}
