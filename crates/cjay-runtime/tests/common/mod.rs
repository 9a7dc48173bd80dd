//! Shared test utilities
//!
//! Sessions here run on `MemoryVm` with a few demo classes installed:
//! - `demo/Calculator`: one method per return kind, static and instance
//! - `demo/Shape` / `demo/Square`: abstract method with a subclass override

#![allow(dead_code)]

use cjay_runtime::backend::memory::{ClassDef, Object, Slot, Throwable};
use cjay_runtime::{ClassBinding, MemoryVm, Session, ToForeign, Value};

// Re-export testing utilities
pub use pretty_assertions::assert_eq;

/// Live session with the demo classes defined
pub fn session() -> Session<MemoryVm> {
    let session: Session<MemoryVm> = Session::new();
    session
        .create(&["-Djava.class.path=demo"])
        .expect("memory runtime starts");
    {
        let mut vm = session.active_context().expect("session is live");
        vm.define_class(calculator());
        vm.define_class(shape());
        vm.define_class(square());
    }
    session
}

/// Local references currently held by the runtime
pub fn live_refs(session: &Session<MemoryVm>) -> usize {
    session
        .active_context()
        .expect("session is live")
        .live_references()
}

pub fn pinned_strings(session: &Session<MemoryVm>) -> usize {
    session
        .active_context()
        .expect("session is live")
        .pinned_strings()
}

fn base(this: &cjay_runtime::backend::memory::ObjRef) -> i32 {
    match this.borrow().field("base") {
        Some(Slot::Prim(Value::Int(v))) => *v,
        _ => 0,
    }
}

fn int_arg(args: &[Value]) -> Result<i32, Throwable> {
    match args {
        [Value::Int(v), ..] => Ok(*v),
        _ => Err(Throwable::illegal_argument("expected int")),
    }
}

pub fn calculator() -> ClassDef {
    ClassDef::new("demo/Calculator")
        .constructor("(I)V", |heap, this, args| {
            let slot = heap.store(&args[0])?;
            this.borrow_mut().set_field("base", slot)
        })
        .static_method("max", "(II)I", |_, args| match args {
            [Value::Int(a), Value::Int(b)] => Ok(Value::Int((*a).max(*b))),
            _ => Err(Throwable::illegal_argument("max")),
        })
        .static_method("half", "(D)D", |_, args| match args {
            [Value::Double(d)] => Ok(Value::Double(d / 2.0)),
            _ => Err(Throwable::illegal_argument("half")),
        })
        .static_method("parse", "(Ljava/lang/String;)I", |heap, args| {
            let text = heap.string(&args[0])?;
            text.trim().parse::<i32>().map(Value::Int).map_err(|_| {
                Throwable::new(
                    "java/lang/NumberFormatException",
                    format!("For input string: \"{}\"", text),
                )
            })
        })
        .method("add", "(I)I", |_, this, args| {
            Ok(Value::Int(base(this) + int_arg(args)?))
        })
        .method("isPositive", "()Z", |_, this, _| {
            Ok(Value::Boolean(base(this) > 0))
        })
        .method("asByte", "()B", |_, this, _| Ok(Value::Byte(base(this) as i8)))
        .method("asShort", "()S", |_, this, _| {
            Ok(Value::Short(base(this) as i16))
        })
        .method("initial", "()C", |_, _, _| Ok(Value::Char(u16::from(b'C'))))
        .method("widen", "()J", |_, this, _| {
            Ok(Value::Long(base(this) as i64 * 1_000_000_000))
        })
        .method("scaled", "(F)F", |_, this, args| match args {
            [Value::Float(f)] => Ok(Value::Float(base(this) as f32 * f)),
            _ => Err(Throwable::illegal_argument("scaled")),
        })
        .method("label", "()Ljava/lang/String;", |heap, this, _| {
            Ok(heap.alloc(Object::Str(format!("calc:{}", base(this)))))
        })
        .method("nothing", "()Ljava/lang/Object;", |_, _, _| Ok(Value::Null))
        .method("reset", "()V", |_, this, _| {
            this.borrow_mut()
                .set_field("base", Slot::Prim(Value::Int(0)))?;
            Ok(Value::Void)
        })
        .method("fail", "()V", |_, _, _| {
            Err(Throwable::new(
                "java/lang/IllegalStateException",
                "calculator is broken",
            ))
        })
}

pub fn shape() -> ClassDef {
    ClassDef::new("demo/Shape")
        .abstract_method("area", "()D")
        .method("describe", "()Ljava/lang/String;", |heap, this, _| {
            let name = this.borrow().class_name().to_string();
            Ok(heap.alloc(Object::Str(format!("shape {}", name))))
        })
}

pub fn square() -> ClassDef {
    ClassDef::new("demo/Square")
        .extends("demo/Shape")
        .constructor("(D)V", |heap, this, args| {
            let slot = heap.store(&args[0])?;
            this.borrow_mut().set_field("side", slot)
        })
        .method("area", "()D", |_, this, _| match this.borrow().field("side") {
            Some(Slot::Prim(Value::Double(s))) => Ok(Value::Double(s * s)),
            _ => Err(Throwable::illegal_argument("side")),
        })
}

/// Binding on `demo/Calculator` with its full signature set, bound
pub fn calculator_binding(session: &Session<MemoryVm>) -> ClassBinding<'_, MemoryVm> {
    let mut calc = ClassBinding::new(session);
    calc.register_constructor("(I)V").unwrap();
    for (name, descriptor, is_static) in [
        ("max", "(II)I", true),
        ("half", "(D)D", true),
        ("parse", "(Ljava/lang/String;)I", true),
        ("add", "(I)I", false),
        ("isPositive", "()Z", false),
        ("asByte", "()B", false),
        ("asShort", "()S", false),
        ("initial", "()C", false),
        ("widen", "()J", false),
        ("scaled", "(F)F", false),
        ("label", "()Ljava/lang/String;", false),
        ("nothing", "()Ljava/lang/Object;", false),
        ("reset", "()V", false),
        ("fail", "()V", false),
    ] {
        calc.register_signature(name, descriptor, is_static).unwrap();
    }
    calc.bind_class("demo/Calculator").unwrap();
    calc
}

/// Build a `java/util/ArrayList` of boxed integers through the bridge
///
/// The returned binding owns the list instance.
pub fn int_list<'s>(session: &'s Session<MemoryVm>, values: &[i32]) -> ClassBinding<'s, MemoryVm> {
    let mut integer = ClassBinding::new(session);
    integer
        .register_signature("valueOf", "(I)Ljava/lang/Integer;", true)
        .unwrap();
    integer.bind_class("java/lang/Integer").unwrap();

    let mut list = ClassBinding::new(session);
    list.register_constructor("()V").unwrap();
    list.register_signature("add", "(Ljava/lang/Object;)Z", false)
        .unwrap();
    list.bind_class("java/util/ArrayList").unwrap();
    list.construct(&[]).unwrap();

    for value in values {
        let boxed = integer
            .call_object("valueOf", &[value.to_foreign()])
            .unwrap()
            .expect("valueOf returns an object");
        assert!(list.call::<bool>("add", &[(&boxed).to_foreign()]).unwrap());
    }
    list
}
