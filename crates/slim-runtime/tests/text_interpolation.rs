use slim_core::{Template, Value};
use slim_runtime::{ComponentDef, MethodError, Runtime};

fn profile(rt: &mut Runtime) -> slim_core::NodeId {
    rt.define(
        ComponentDef::new("x-profile")
            .property("name", "Ann")
            .method("ageOf", |_, _, args| match args.first().and_then(Value::as_str) {
                Some("Ann") => Ok(Value::from(30)),
                Some("Bob") => Ok(Value::from(41)),
                Some(other) => Err(MethodError::failed(format!("unknown person {other}"))),
                None => Err(MethodError::failed("missing name")),
            })
            .template(
                Template::element("p")
                    .attr("bind", "")
                    .text("Hello [[name]], you are [[ageOf(name)]]"),
            ),
    );
    rt.create_component("x-profile").expect("component")
}

#[test]
fn initial_render_substitutes_every_span() {
    let mut rt = Runtime::new();
    let node = profile(&mut rt);
    assert_eq!(rt.document().text_content(node), "Hello Ann, you are 30");
}

#[test]
fn one_write_updates_path_and_method_spans() {
    let mut rt = Runtime::new();
    let node = profile(&mut rt);
    rt.set_property(node, "name", "Bob");
    assert_eq!(rt.document().text_content(node), "Hello Bob, you are 41");
}

#[test]
fn failing_method_keeps_its_span_and_renders_the_rest() {
    let mut rt = Runtime::new();
    let node = profile(&mut rt);
    rt.set_property(node, "name", "Eve");
    assert_eq!(
        rt.document().text_content(node),
        "Hello Eve, you are [[ageOf(name)]]"
    );
}

#[test]
fn recomposition_starts_from_the_source_text() {
    let mut rt = Runtime::new();
    let node = profile(&mut rt);
    for name in ["Bob", "Ann", "Bob"] {
        rt.set_property(node, "name", name);
    }
    assert_eq!(rt.document().text_content(node), "Hello Bob, you are 41");
}

#[test]
fn nested_paths_resolve_through_records() {
    let mut rt = Runtime::new();
    rt.define(
        ComponentDef::new("x-user").template(
            Template::element("span")
                .attr("bind", "")
                .text("[[user.name]] <[[user.mail.host]]>"),
        ),
    );
    let node = rt.create_component("x-user").expect("component");
    assert_eq!(rt.document().text_content(node), "undefined <undefined>");

    let mail = Value::record([("host", Value::str("example.org"))]);
    rt.set_property(
        node,
        "user",
        Value::record([("name", Value::str("ada")), ("mail", mail)]),
    );
    assert_eq!(rt.document().text_content(node), "ada <example.org>");
}

#[test]
fn text_without_bind_attribute_is_literal() {
    let mut rt = Runtime::new();
    rt.define(ComponentDef::new("x-raw").template(Template::element("p").text("[[name]]")));
    let node = rt.create_component("x-raw").expect("component");
    rt.set_property(node, "name", "ignored");
    assert_eq!(rt.document().text_content(node), "[[name]]");
}
