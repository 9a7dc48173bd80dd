//! Value converter tests: strings, lists and unboxing

mod common;

use cjay_runtime::backend::memory::{Boxed, Object};
use cjay_runtime::{BridgeError, ClassBinding, Converter, ForeignRuntime, Value};
use common::assert_eq;
use rstest::rstest;

#[rstest]
#[case("")]
#[case("hello, world")]
#[case("nul\0inside")]
#[case("\0")]
#[case("ünïcödé ☕")]
fn test_string_round_trip(#[case] text: &str) {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();

    let foreign = converter.new_string(text).unwrap();
    assert_eq!(converter.string_from(foreign.handle()).unwrap(), text);
    assert_eq!(common::pinned_strings(&session), 0);

    drop(foreign);
    assert_eq!(common::live_refs(&session), 0);
}

#[test]
fn test_string_from_non_string() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[1]);

    let err = converter
        .string_from(list.instance().unwrap())
        .unwrap_err();
    assert!(matches!(err, BridgeError::ForeignException { .. }));
    assert_eq!(common::pinned_strings(&session), 0);
}

#[test]
fn test_to_vec_both_forms_agree() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[1, 2, 3]);
    let handle = list.instance().unwrap();
    let baseline = common::live_refs(&session);

    let size = converter.size_of(handle).unwrap();
    assert_eq!(size, 3);

    let discovered: Vec<i32> = converter.to_vec(handle).unwrap();
    let precomputed: Vec<i32> = converter.to_vec_with_size(handle, size).unwrap();
    assert_eq!(discovered, vec![1, 2, 3]);
    assert_eq!(discovered, precomputed);

    // every element reference was released
    assert_eq!(common::live_refs(&session), baseline);
}

#[test]
fn test_empty_list() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[]);
    let handle = list.instance().unwrap();

    assert_eq!(converter.size_of(handle), Ok(0));
    assert_eq!(converter.to_vec::<i32>(handle), Ok(vec![]));
    assert_eq!(converter.to_vec_with_size::<i32>(handle, 0), Ok(vec![]));
    assert_eq!(converter.list_to_string(handle).unwrap(), "[]");
}

#[test]
fn test_to_vec_other_numeric_kinds() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[-1, 0, 70_000]);
    let handle = list.instance().unwrap();

    assert_eq!(converter.to_vec::<i64>(handle), Ok(vec![-1, 0, 70_000]));
    assert_eq!(converter.to_vec::<f64>(handle), Ok(vec![-1.0, 0.0, 70_000.0]));
    assert_eq!(converter.to_vec::<f32>(handle), Ok(vec![-1.0, 0.0, 70_000.0]));
    // narrowing accessors keep the low-order bits
    assert_eq!(converter.to_vec::<i16>(handle), Ok(vec![-1, 0, 4_464]));
    assert_eq!(converter.to_vec::<i8>(handle), Ok(vec![-1, 0, 112]));
}

#[test]
fn test_mixed_boxed_values_unbox() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[]);
    let handle = list.instance().unwrap();
    {
        let mut vm = session.active_context().unwrap();
        let long = vm.alloc(Object::Boxed(Boxed::Long(5_000_000_000))).unwrap();
        let double = vm.alloc(Object::Boxed(Boxed::Double(2.75))).unwrap();
        drop(vm);

        let mut adder = ClassBinding::new(&session);
        adder
            .register_signature("add", "(Ljava/lang/Object;)Z", false)
            .unwrap();
        adder.bind_class("java/util/ArrayList").unwrap();
        for element in [long, double] {
            assert_eq!(
                adder.invoke_on(handle, "add", &[Value::Object(element)]),
                Ok(Value::Boolean(true))
            );
            session.release_reference(element).unwrap();
        }
    }

    assert_eq!(converter.to_vec::<i64>(handle), Ok(vec![5_000_000_000, 2]));
    assert_eq!(converter.to_vec::<f64>(handle), Ok(vec![5_000_000_000.0, 2.75]));
    assert_eq!(converter.to_vec::<i32>(handle), Ok(vec![705_032_704, 2]));
}

#[test]
fn test_null_element_is_reported() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[7]);
    assert_eq!(list.call::<bool>("add", &[Value::Null]), Ok(true));
    let handle = list.instance().unwrap();
    let baseline = common::live_refs(&session);

    assert_eq!(
        converter.to_vec::<i32>(handle),
        Err(BridgeError::NullReference("list element 1 is null".to_string()))
    );
    assert_eq!(common::live_refs(&session), baseline);
}

#[test]
fn test_size_beyond_list_raises() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[1, 2]);
    let handle = list.instance().unwrap();
    let baseline = common::live_refs(&session);

    let err = converter.to_vec_with_size::<i32>(handle, 3).unwrap_err();
    assert_eq!(
        err,
        BridgeError::ForeignException {
            method: "get".to_string(),
            description: "java.lang.IndexOutOfBoundsException: Index 2 out of bounds for length 2"
                .to_string(),
        }
    );
    assert_eq!(common::live_refs(&session), baseline);
    assert!(!session.active_context().unwrap().exception_check());
}

#[test]
fn test_list_to_string() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[1, 2, 3]);
    let baseline = common::live_refs(&session);

    assert_eq!(
        converter.list_to_string(list.instance().unwrap()).unwrap(),
        "[1, 2, 3]"
    );
    assert_eq!(common::live_refs(&session), baseline);
    assert_eq!(common::pinned_strings(&session), 0);
}

#[test]
fn test_list_containing_itself_to_string() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[1, 2]);
    let handle = list.instance().unwrap();
    assert_eq!(list.call::<bool>("add", &[Value::Object(handle)]), Ok(true));
    let baseline = common::live_refs(&session);

    assert_eq!(
        converter.list_to_string(handle).unwrap(),
        "[1, 2, (this Collection)]"
    );
    assert_eq!(converter.size_of(handle), Ok(3));
    assert_eq!(common::live_refs(&session), baseline);
}

#[test]
fn test_to_object_vec_scopes_elements() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let list = common::int_list(&session, &[4, 5]);
    assert_eq!(list.call::<bool>("add", &[Value::Null]), Ok(true));
    let handle = list.instance().unwrap();
    let baseline = common::live_refs(&session);

    let elements = converter.to_object_vec(handle).unwrap();
    assert_eq!(elements.len(), 3);
    assert!(elements[0].is_some());
    assert!(elements[2].is_none());
    assert_eq!(common::live_refs(&session), baseline + 2);

    drop(elements);
    assert_eq!(common::live_refs(&session), baseline);
}

#[test]
fn test_release_reference() {
    let session = common::session();
    let converter = Converter::new(&session).unwrap();
    let raw = converter.new_string("temporary").unwrap().into_raw();
    assert_eq!(common::live_refs(&session), 1);
    converter.release_reference(raw).unwrap();
    assert_eq!(common::live_refs(&session), 0);
}
