//! Class binding and dispatch tests

mod common;

use cjay_runtime::{
    BindingState, BridgeError, ClassBinding, Converter, ForeignRuntime, ReturnKind, ToForeign,
    Value, CONSTRUCTOR_NAME,
};
use common::assert_eq;
use rstest::rstest;

#[test]
fn test_bind_resolves_every_entry() {
    let session = common::session();
    let calc = common::calculator_binding(&session);

    assert_eq!(calc.state(), BindingState::Bound);
    assert_eq!(calc.class_name(), Some("demo/Calculator"));
    assert!(calc.class_handle().is_some());
    for entry in calc.list_signatures() {
        assert!(entry.dispatch().is_some(), "{} unresolved", entry);
    }
}

#[test]
fn test_bind_is_atomic() {
    let session = common::session();
    let mut calc = ClassBinding::new(&session);
    calc.register_signature("add", "(I)I", false).unwrap();
    calc.register_signature("max", "(II)I", true).unwrap();
    calc.register_signature("missing", "()V", false).unwrap();

    let err = calc.bind_class("demo/Calculator").unwrap_err();
    match err {
        BridgeError::MethodResolutionFailed {
            class,
            method,
            descriptor,
            cause,
        } => {
            assert_eq!(class, "demo/Calculator");
            assert_eq!(method, "missing");
            assert_eq!(descriptor, "()V");
            assert!(cause.unwrap().contains("NoSuchMethodError"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(calc.state(), BindingState::Unbound);
    assert!(calc.class_handle().is_none());
    assert!(calc.dispatch_handle("add").is_none());
    assert!(calc.dispatch_handle("max").is_none());
    assert!(!session.active_context().unwrap().exception_check());
}

#[test]
fn test_failed_rebind_keeps_working_binding() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);
    let instance = calc.construct(&[5i32.into()]).unwrap();
    let class = calc.class_handle();
    let add = calc.dispatch_handle("add");

    calc.register_signature("missing", "()V", false).unwrap();
    assert!(matches!(
        calc.bind_class("demo/Calculator"),
        Err(BridgeError::MethodResolutionFailed { ref method, .. }) if method == "missing"
    ));

    assert_eq!(calc.state(), BindingState::Instantiated);
    assert_eq!(calc.instance(), Some(instance));
    assert_eq!(calc.class_handle(), class);
    assert_eq!(calc.dispatch_handle("add"), add);
    assert!(calc.dispatch_handle("missing").is_none());
    assert_eq!(calc.call::<i32>("add", &[1i32.into()]), Ok(6));
    assert_eq!(common::live_refs(&session), 1);
}

#[test]
fn test_successful_rebind_releases_instance() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);
    calc.construct(&[5i32.into()]).unwrap();
    assert_eq!(common::live_refs(&session), 1);

    calc.bind_class("demo/Calculator").unwrap();
    assert_eq!(calc.state(), BindingState::Bound);
    assert_eq!(common::live_refs(&session), 0);
}

#[test]
fn test_static_flag_must_match_class() {
    let session = common::session();
    let mut calc = ClassBinding::new(&session);
    // `max` is static on the class
    calc.register_signature("max", "(II)I", false).unwrap();
    assert!(matches!(
        calc.bind_class("demo/Calculator"),
        Err(BridgeError::MethodResolutionFailed { .. })
    ));
}

#[test]
fn test_class_not_found() {
    let session = common::session();
    let mut binding = ClassBinding::new(&session);
    let err = binding.bind_class("demo/Nowhere").unwrap_err();
    assert!(matches!(
        err,
        BridgeError::ClassNotFound { ref class, .. } if class == "demo/Nowhere"
    ));
    assert_eq!(err.to_string(), "Can't find class: demo/Nowhere");
    assert!(!session.active_context().unwrap().exception_check());
}

#[test]
fn test_static_dispatch_ignores_instance() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);

    assert_eq!(calc.call::<i32>("max", &[3i32.into(), 9i32.into()]), Ok(9));
    calc.construct(&[100i32.into()]).unwrap();
    assert_eq!(calc.call::<i32>("max", &[3i32.into(), 9i32.into()]), Ok(9));
    assert_eq!(calc.call::<f64>("half", &[5.0f64.into()]), Ok(2.5));
}

#[test]
fn test_instance_call_requires_construct() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);

    assert_eq!(
        calc.call::<i32>("add", &[1i32.into()]),
        Err(BridgeError::InstanceNotBound("add".to_string()))
    );
    calc.construct(&[40i32.into()]).unwrap();
    assert_eq!(calc.state(), BindingState::Instantiated);
    assert_eq!(calc.call::<i32>("add", &[2i32.into()]), Ok(42));
}

#[test]
fn test_every_return_kind() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);
    calc.construct(&[300i32.into()]).unwrap();

    assert_eq!(calc.call::<bool>("isPositive", &[]), Ok(true));
    assert_eq!(calc.call::<i8>("asByte", &[]), Ok(44));
    assert_eq!(calc.call::<u16>("initial", &[]), Ok(u16::from(b'C')));
    assert_eq!(calc.call::<i16>("asShort", &[]), Ok(300));
    assert_eq!(calc.call::<i32>("add", &[1i32.into()]), Ok(301));
    assert_eq!(calc.call::<i64>("widen", &[]), Ok(300_000_000_000));
    assert_eq!(calc.call::<f32>("scaled", &[0.5f32.into()]), Ok(150.0));
    assert_eq!(calc.call::<f64>("half", &[1.0f64.into()]), Ok(0.5));
    assert_eq!(calc.call::<()>("reset", &[]), Ok(()));
    assert_eq!(calc.call::<bool>("isPositive", &[]), Ok(false));

    let label = calc.call_object("label", &[]).unwrap().unwrap();
    let converter = Converter::new(&session).unwrap();
    assert_eq!(converter.string_from(label.handle()).unwrap(), "calc:0");
    assert!(calc.call_object("nothing", &[]).unwrap().is_none());
}

#[rstest]
#[case("unknownMethod")]
#[case("")]
#[case("Add")]
fn test_unknown_method_leaves_registry(#[case] name: &str) {
    let session = common::session();
    let calc = common::calculator_binding(&session);
    let before = calc.signature_count();

    assert_eq!(
        calc.call::<i32>(name, &[]),
        Err(BridgeError::UnknownMethod(name.to_string()))
    );
    assert_eq!(calc.signature_count(), before);
    assert_eq!(calc.state(), BindingState::Bound);
}

#[test]
fn test_requested_kind_must_match_registry() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);
    calc.construct(&[1i32.into()]).unwrap();

    assert_eq!(
        calc.call::<i64>("add", &[1i32.into()]),
        Err(BridgeError::ReturnKindMismatch {
            method: "add".to_string(),
            declared: ReturnKind::Int,
            requested: ReturnKind::Long,
        })
    );
    assert_eq!(calc.call_value("add", &[1i32.into()]), Ok(Value::Int(2)));
}

#[test]
fn test_argument_mismatch() {
    let session = common::session();
    let calc = common::calculator_binding(&session);

    assert!(matches!(
        calc.call::<i32>("max", &[1i32.into()]),
        Err(BridgeError::ArgumentMismatch { .. })
    ));
    assert!(matches!(
        calc.call::<f64>("half", &[1.5f32.into()]),
        Err(BridgeError::ArgumentMismatch { .. })
    ));
}

#[test]
fn test_foreign_exception_is_cleared() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);
    calc.construct(&[5i32.into()]).unwrap();

    let err = calc.call::<()>("fail", &[]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::ForeignException {
            method: "fail".to_string(),
            description: "java.lang.IllegalStateException: calculator is broken".to_string(),
        }
    );
    assert!(!session.active_context().unwrap().exception_check());
    assert_eq!(calc.call::<i32>("add", &[1i32.into()]), Ok(6));
}

#[test]
fn test_static_call_with_string_argument() {
    let session = common::session();
    let calc = common::calculator_binding(&session);

    let text = session.new_string(" 17 ").unwrap();
    assert_eq!(calc.call::<i32>("parse", &[(&text).to_foreign()]), Ok(17));

    let bad = session.new_string("seventeen").unwrap();
    let err = calc.call::<i32>("parse", &[(&bad).to_foreign()]).unwrap_err();
    assert!(err.to_string().contains("NumberFormatException"));
}

#[test]
fn test_constructor_not_bound() {
    let session = common::session();
    let mut calc = ClassBinding::new(&session);
    calc.register_signature("max", "(II)I", true).unwrap();
    calc.bind_class("demo/Calculator").unwrap();
    assert_eq!(calc.construct(&[]), Err(BridgeError::ConstructorNotBound));

    // registered after binding: present but unresolved
    calc.register_constructor("(I)V").unwrap();
    assert_eq!(calc.construct(&[1i32.into()]), Err(BridgeError::ConstructorNotBound));

    calc.bind_class("demo/Calculator").unwrap();
    assert!(calc.construct(&[1i32.into()]).is_ok());
}

#[test]
fn test_registration_after_bind_is_unresolved() {
    let session = common::session();
    let mut calc = common::calculator_binding(&session);
    calc.register_signature("max", "(II)I", true).unwrap();

    assert!(calc.dispatch_handle("max").is_none());
    assert_eq!(
        calc.call::<i32>("max", &[1i32.into(), 2i32.into()]),
        Err(BridgeError::MethodNotBound("max".to_string()))
    );
}

#[test]
fn test_virtual_dispatch_through_base_class() {
    let session = common::session();
    let mut square = ClassBinding::new(&session);
    square.register_constructor("(D)V").unwrap();
    square.bind_class("demo/Square").unwrap();
    let instance = square.construct(&[3.0f64.into()]).unwrap();

    let mut shape = ClassBinding::new(&session);
    shape.register_signature("area", "()D", false).unwrap();
    shape.register_signature("describe", "()Ljava/lang/String;", false)
        .unwrap();
    shape.bind_class("demo/Shape").unwrap();

    assert_eq!(shape.invoke_on(instance, "area", &[]), Ok(Value::Double(9.0)));
    let text = match shape.invoke_on(instance, "describe", &[]).unwrap() {
        Value::Object(handle) => session.local(handle),
        other => panic!("expected object, got {other}"),
    };
    let converter = Converter::new(&session).unwrap();
    assert_eq!(converter.string_from(text.handle()).unwrap(), "shape demo/Square");
}

#[test]
fn test_list_signatures_ordered() {
    let session = common::session();
    let mut binding = ClassBinding::new(&session);
    binding.register_signature("size", "()I", false).unwrap();
    binding.register_constructor("()V").unwrap();
    binding.register_signature("add", "(Ljava/lang/Object;)Z", false)
        .unwrap();

    let listed: Vec<String> = binding
        .list_signatures()
        .iter()
        .map(|e| e.to_string())
        .collect();
    assert_eq!(
        listed,
        vec![
            format!("<Method:{}, Descriptor:()V, isStatic:false>", CONSTRUCTOR_NAME),
            "<Method:add, Descriptor:(Ljava/lang/Object;)Z, isStatic:false>".to_string(),
            "<Method:size, Descriptor:()I, isStatic:false>".to_string(),
        ]
    );
    assert_eq!(binding.descriptor("size").unwrap().as_str(), "()I");
    assert_eq!(binding.return_kind("add"), Some(ReturnKind::Boolean));
}

#[test]
fn test_malformed_registration_leaves_registry() {
    let session = common::session();
    let mut binding = ClassBinding::new(&session);
    binding.register_signature("size", "()I", false).unwrap();
    assert!(matches!(
        binding.register_signature("size", "()W", false),
        Err(BridgeError::MalformedDescriptor { .. })
    ));
    assert_eq!(binding.descriptor("size").unwrap().as_str(), "()I");
}

#[test]
fn test_instances_released() {
    let session = common::session();
    {
        let mut calc = common::calculator_binding(&session);
        calc.construct(&[1i32.into()]).unwrap();
        calc.construct(&[2i32.into()]).unwrap();
        assert_eq!(common::live_refs(&session), 1);
        let _ = calc.call_object("label", &[]).unwrap();
        assert_eq!(common::live_refs(&session), 1);
    }
    assert_eq!(common::live_refs(&session), 0);
}
