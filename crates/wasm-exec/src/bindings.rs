//! Host values injected into a guest run as mutable globals
//!
//! Values are classified into one of four wasm global types by a pure
//! function before any store exists, then materialised in the per-run store
//! and defined in the [`BINDINGS_NAMESPACE`] import namespace. Keeping them in
//! their own namespace means they can never shadow the guest's own exports or
//! the WASI imports.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use wasmtime::{
    ExternRef, Func, FuncType, Global, GlobalType, Linker, Mutability, Store, Val, ValType,
};

/// Import module name under which bindings are defined
pub const BINDINGS_NAMESPACE: &str = "host";

/// Errors that occur while classifying or defining bindings
#[derive(Debug, Error)]
pub enum GlobalBindingError {
    #[error("binding name {0:?} is not an identifier")]
    InvalidName(String),

    #[error("binding `{name}` holds {value}, which does not fit in a 32-bit integer")]
    IntegerOutOfRange { name: String, value: i64 },

    #[error("binding `{name}` has no numeric or callable representation and opaque values are disabled")]
    Unrepresentable { name: String },

    #[error("failed to define binding `{name}`: {source}")]
    Define {
        name: String,
        #[source]
        source: wasmtime::Error,
    },
}

type Callback = dyn Fn(&[Val], &mut [Val]) -> wasmtime::Result<()> + Send + Sync;

/// A host function exposed to the guest as a `funcref` global
#[derive(Clone)]
pub struct HostFunc {
    params: Vec<ValType>,
    results: Vec<ValType>,
    callback: Arc<Callback>,
}

impl HostFunc {
    /// Wrap `callback` with the given wasm signature.
    ///
    /// The callback receives the guest's arguments and must fill every slot
    /// of the results slice.
    pub fn new<F>(
        params: impl IntoIterator<Item = ValType>,
        results: impl IntoIterator<Item = ValType>,
        callback: F,
    ) -> Self
    where
        F: Fn(&[Val], &mut [Val]) -> wasmtime::Result<()> + Send + Sync + 'static,
    {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
            callback: Arc::new(callback),
        }
    }

    pub fn params(&self) -> &[ValType] {
        &self.params
    }

    pub fn results(&self) -> &[ValType] {
        &self.results
    }

    /// Call the wrapped function directly
    pub fn call(&self, params: &[Val], results: &mut [Val]) -> wasmtime::Result<()> {
        (self.callback)(params, results)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc")
            .field("params", &self.params)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

/// A value bound to a name for a single run
#[derive(Clone)]
pub enum HostValue {
    Int(i64),
    Float(f64),
    Func(HostFunc),
    /// Anything else, passed by reference and opaque to the guest
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl HostValue {
    /// Wrap an arbitrary host value as an opaque reference
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Func(func) => f.debug_tuple("Func").field(func).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<HostFunc> for HostValue {
    fn from(value: HostFunc) -> Self {
        Self::Func(value)
    }
}

/// Name to value mapping supplied with a request
pub type Bindings = HashMap<String, HostValue>;

/// Wasm global type a binding is materialised as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    I32,
    F64,
    FuncRef,
    ExternRef,
}

impl GlobalKind {
    pub fn val_type(self) -> ValType {
        match self {
            Self::I32 => ValType::I32,
            Self::F64 => ValType::F64,
            Self::FuncRef => ValType::FUNCREF,
            Self::ExternRef => ValType::EXTERNREF,
        }
    }
}

/// A classified binding ready to be injected
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub value: HostValue,
    pub kind: GlobalKind,
}

/// Merge two binding sets; entries in `locals` replace same-named entries in
/// `globals`. The result is ordered by name.
pub fn merge<'a>(globals: &'a Bindings, locals: &'a Bindings) -> BTreeMap<&'a str, &'a HostValue> {
    let mut merged: BTreeMap<&str, &HostValue> = globals
        .iter()
        .map(|(name, value)| (name.as_str(), value))
        .collect();
    merged.extend(locals.iter().map(|(name, value)| (name.as_str(), value)));
    merged
}

/// Decide which global type represents `value`
pub fn classify(
    name: &str,
    value: &HostValue,
    allow_opaque: bool,
) -> Result<GlobalKind, GlobalBindingError> {
    if !is_identifier(name) {
        return Err(GlobalBindingError::InvalidName(name.to_owned()));
    }

    match value {
        HostValue::Int(v) => match i32::try_from(*v) {
            Ok(_) => Ok(GlobalKind::I32),
            Err(_) => Err(GlobalBindingError::IntegerOutOfRange {
                name: name.to_owned(),
                value: *v,
            }),
        },
        HostValue::Float(_) => Ok(GlobalKind::F64),
        HostValue::Func(_) => Ok(GlobalKind::FuncRef),
        HostValue::Opaque(_) if allow_opaque => Ok(GlobalKind::ExternRef),
        HostValue::Opaque(_) => Err(GlobalBindingError::Unrepresentable {
            name: name.to_owned(),
        }),
    }
}

/// Merge and classify the bindings of one request
pub fn resolve(
    globals: &Bindings,
    locals: &Bindings,
    allow_opaque: bool,
) -> Result<Vec<Binding>, GlobalBindingError> {
    merge(globals, locals)
        .into_iter()
        .map(|(name, value)| {
            let kind = classify(name, value, allow_opaque)?;
            Ok(Binding {
                name: name.to_owned(),
                value: value.clone(),
                kind,
            })
        })
        .collect()
}

/// Render numeric bindings as assignment statements, one per line.
///
/// Function and opaque bindings have no source form and are skipped.
pub fn render_prelude(bindings: &[Binding]) -> String {
    let mut prelude = String::new();
    for binding in bindings {
        let literal = match &binding.value {
            HostValue::Int(v) => v.to_string(),
            HostValue::Float(v) => float_literal(*v),
            HostValue::Func(_) | HostValue::Opaque(_) => continue,
        };
        prelude.push_str(&binding.name);
        prelude.push_str(" = ");
        prelude.push_str(&literal);
        prelude.push('\n');
    }
    prelude
}

/// Define every binding as a mutable global in the bindings namespace of
/// `linker`, allocating any function or extern references in `store`
pub fn inject<T: 'static>(
    store: &mut Store<T>,
    linker: &mut Linker<T>,
    bindings: &[Binding],
) -> Result<(), GlobalBindingError> {
    for binding in bindings {
        let define_err = |source| GlobalBindingError::Define {
            name: binding.name.clone(),
            source,
        };

        let val = match &binding.value {
            HostValue::Int(v) => {
                let v = i32::try_from(*v).map_err(|_| GlobalBindingError::IntegerOutOfRange {
                    name: binding.name.clone(),
                    value: *v,
                })?;
                Val::I32(v)
            }
            HostValue::Float(v) => Val::F64(v.to_bits()),
            HostValue::Func(func) => {
                let ty = FuncType::new(
                    store.engine(),
                    func.params.iter().cloned(),
                    func.results.iter().cloned(),
                );
                let callback = Arc::clone(&func.callback);
                let func = Func::new(&mut *store, ty, move |_caller, params, results| {
                    callback(params, results)
                });
                Val::FuncRef(Some(func))
            }
            HostValue::Opaque(obj) => {
                let extern_ref = ExternRef::new(&mut *store, Arc::clone(obj)).map_err(define_err)?;
                Val::ExternRef(Some(extern_ref))
            }
        };

        let ty = GlobalType::new(binding.kind.val_type(), Mutability::Var);
        let global = Global::new(&mut *store, ty, val).map_err(define_err)?;
        linker
            .define(&*store, BINDINGS_NAMESPACE, &binding.name, global)
            .map_err(define_err)?;

        debug!(name = %binding.name, kind = ?binding.kind, "defined binding");
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "float('nan')".to_owned()
    } else if v.is_infinite() {
        if v > 0.0 {
            "float('inf')".to_owned()
        } else {
            "float('-inf')".to_owned()
        }
    } else {
        // Debug keeps the fractional part, so 1.0 stays a float literal.
        format!("{v:?}")
    }
}
