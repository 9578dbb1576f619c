use webtest_engine::browser::driver::{Browser, BrowserContext, NodeDescription, NodeHandle, Page, PathSegment};
use webtest_engine::browser::mock::{MockBrowser, MockDocument, MockElement};
use webtest_engine::selector::unique::{selector_for, selector_or_fallback};
use webtest_engine::selector::{
    Selector, SelectorStrategy, SelectorType, generate_unique_selector, resolve_selector,
};

// =========================================================================
// Selector resolution
// =========================================================================

#[test]
fn resolve_maps_every_selector_type() {
    let cases = [
        (SelectorType::Id, "submit", "#submit"),
        (SelectorType::Name, "email", "[name=\"email\"]"),
        (SelectorType::Css, "form > button.primary", "form > button.primary"),
        (SelectorType::Xpath, "//button[1]", "xpath=//button[1]"),
        (SelectorType::LinkText, "Sign in", "text=Sign in"),
        (SelectorType::ClassName, "card", ".card"),
        (SelectorType::TagName, "table", "table"),
        (SelectorType::Unknown, "raw-value", "raw-value"),
    ];
    for (kind, value, expected) in cases {
        let selector = Selector::new(kind.clone(), value);
        assert_eq!(resolve_selector(Some(&selector)), expected, "{:?}", kind);
    }
}

#[test]
fn resolve_absent_selector_is_empty() {
    assert_eq!(resolve_selector(None), "");
}

#[test]
fn resolve_is_pure() {
    let selector = Selector::id("login");
    assert_eq!(resolve_selector(Some(&selector)), resolve_selector(Some(&selector)));
}

#[test]
fn selector_deserializes_from_suite_json() {
    let selector: Selector =
        serde_json::from_str(r#"{"type":"className","value":"nav-item"}"#).unwrap();
    assert_eq!(selector.kind, SelectorType::ClassName);
    assert_eq!(selector.to_query(), ".nav-item");
}

#[test]
fn selector_with_unknown_or_missing_type_uses_raw_value() {
    let odd: Selector = serde_json::from_str(r#"{"type":"aria","value":"main"}"#).unwrap();
    assert_eq!(odd.kind, SelectorType::Unknown);
    assert_eq!(odd.to_query(), "main");

    let bare: Selector = serde_json::from_str(r#"{"value":"div.panel"}"#).unwrap();
    assert_eq!(bare.kind, SelectorType::Unknown);
    assert_eq!(bare.to_query(), "div.panel");
}

#[test]
fn selector_type_serializes_as_camel_case_string() {
    let json = serde_json::to_value(Selector::new(SelectorType::LinkText, "Home")).unwrap();
    assert_eq!(json["type"], "linkText");
    assert_eq!(json["value"], "Home");
}

// =========================================================================
// Unique selector rules
// =========================================================================

fn description(tag: &str) -> NodeDescription {
    NodeDescription {
        tag: tag.into(),
        path: vec![
            PathSegment {
                tag: "div".into(),
                nth_of_type: 2,
            },
            PathSegment {
                tag: tag.into(),
                nth_of_type: 1,
            },
        ],
        ..Default::default()
    }
}

#[test]
fn id_wins_over_every_other_rule() {
    let node = NodeDescription {
        id: Some("save".into()),
        name: Some("save-btn".into()),
        classes: vec!["btn".into()],
        ..description("button")
    };
    let selector = selector_for(&node);
    assert_eq!(selector.value, "#save");
    assert_eq!(selector.strategy, SelectorStrategy::Id);
}

#[test]
fn name_used_when_no_id() {
    let node = NodeDescription {
        name: Some("email".into()),
        classes: vec!["x".into()],
        ..description("input")
    };
    let selector = selector_for(&node);
    assert_eq!(selector.value, "input[name=\"email\"]");
    assert_eq!(selector.strategy, SelectorStrategy::Name);
}

#[test]
fn full_class_list_used_even_when_longer() {
    let node = NodeDescription {
        classes: vec!["btn".into(), "btn-primary".into(), "wide".into()],
        ..description("a")
    };
    let selector = selector_for(&node);
    assert_eq!(selector.value, "a.btn.btn-primary.wide");
    assert_eq!(selector.strategy, SelectorStrategy::ClassList);
}

#[test]
fn empty_id_and_name_fall_through() {
    let node = NodeDescription {
        id: Some(String::new()),
        name: Some(String::new()),
        ..description("span")
    };
    assert_eq!(selector_for(&node).strategy, SelectorStrategy::Path);
}

#[test]
fn positional_path_starts_at_body() {
    let selector = selector_for(&description("span"));
    assert_eq!(
        selector.value,
        "body > div:nth-of-type(2) > span:nth-of-type(1)"
    );
    assert_eq!(selector.strategy, SelectorStrategy::Path);
}

#[tokio::test]
async fn generated_path_resolves_back_to_the_node() {
    let mut doc = MockDocument::new("Paths");
    doc.push(MockElement::new("div"));
    let panel = doc.push(MockElement::new("div"));
    doc.push(MockElement::new("span").child_of(panel));
    let target = doc.push(MockElement::new("span").child_of(panel));

    let browser = MockBrowser::new().with_document("https://paths.test/", doc.clone());
    let context = browser.new_context().await.unwrap();
    let page = context.new_page().await.unwrap();
    page.goto("https://paths.test/").await.unwrap();

    let handle = NodeHandle::new(target.to_string(), "span");
    let selector = generate_unique_selector(page.as_ref(), &handle).await.unwrap();
    assert_eq!(selector.value, "body > div:nth-of-type(2) > span:nth-of-type(2)");
    assert_eq!(doc.query(&selector.value), vec![target]);
}

#[tokio::test]
async fn detached_node_degrades_to_tag() {
    let doc = MockDocument::new("Gone").with(MockElement::new("button").id("x").detached());
    let browser = MockBrowser::new().with_document("https://gone.test/", doc);
    let context = browser.new_context().await.unwrap();
    let page = context.new_page().await.unwrap();
    page.goto("https://gone.test/").await.unwrap();

    let handle = NodeHandle::new("0", "button");
    let degraded = generate_unique_selector(page.as_ref(), &handle)
        .await
        .unwrap_err();
    assert_eq!(degraded.fallback(), "button");

    let (value, fell_back) = selector_or_fallback(page.as_ref(), &handle).await;
    assert_eq!(value, "button");
    assert!(fell_back);
}
