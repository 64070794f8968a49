//! Runtime values of the sandbox interpreter.
//!
//! Heap values (arrays, objects, promises) are shared through `Rc<RefCell<_>>`
//! so aliasing behaves like the script language expects. Everything here is
//! confined to the sandbox thread.

use super::coroutine::Continuation;
use super::interpreter::Interpreter;
use super::regexp::RegexValue;
use crate::script::ast::FunctionDef;
use crate::script::printer::format_number;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<JsObject>>;
pub type PromiseRef = Rc<RefCell<PromiseState>>;

/// Why execution stopped without finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    Timeout,
    Cancelled,
}

/// Non-local exit from evaluation
#[derive(Clone)]
pub enum Abrupt {
    /// Script-level exception, catchable
    Throw(Value),
    /// Sandbox teardown, never catchable and skips `finally`
    Halted(HaltReason),
}

pub type EvalResult = Result<Value, Abrupt>;

/// Signature of every builtin
pub type NativeFn = fn(&mut Interpreter, NativeCall) -> EvalResult;

/// Arguments handed to a builtin
pub struct NativeCall {
    pub this: Value,
    pub args: Vec<Value>,
    /// Values captured when the builtin was created
    pub captures: Vec<Value>,
}

impl NativeCall {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Undefined)
    }

    pub fn capture(&self, index: usize) -> Value {
        self.captures.get(index).cloned().unwrap_or(Value::Undefined)
    }
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Class(Rc<ClassValue>),
    Promise(PromiseRef),
    Regex(Rc<RegexValue>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", inspect(self))
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: Vec<(String, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(JsObject {
            props,
            ..JsObject::default()
        })))
    }

    pub fn native(name: &str, func: NativeFn) -> Self {
        Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func,
            captures: Vec::new(),
        }))
    }

    pub fn native_with(name: &str, func: NativeFn, captures: Vec<Value>) -> Self {
        Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func,
            captures,
        }))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) | Value::Class(_) => "function",
            Value::Null
            | Value::Array(_)
            | Value::Object(_)
            | Value::Promise(_)
            | Value::Regex(_) => "object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// `String(value)` conversion
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(obj) => match error_parts(&obj.borrow()) {
                Some((name, message)) if message.is_empty() => name,
                Some((name, message)) => format!("{}: {}", name, message),
                None => "[object Object]".to_string(),
            },
            Value::Function(closure) => format!("function {}() {{ [code] }}", closure.name),
            Value::Native(native) => format!("function {}() {{ [native code] }}", native.name),
            Value::Class(class) => format!("class {} {{ }}", class.name),
            Value::Promise(_) => "[object Promise]".to_string(),
            Value::Regex(regex) => regex.display(),
        }
    }

    /// Identity for reference types, value equality for primitives
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Regex(a), Value::Regex(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==` with the usual coercions between primitives
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(
                    (self, other),
                    (Value::Bool(_), Value::Bool(_))
                ) {
                    return self.strict_equals(other);
                }
                self.to_number() == other.to_number()
            }
            (Value::Array(_) | Value::Object(_), Value::Str(_) | Value::Number(_)) => {
                Value::from(self.to_js_string()).loose_equals(other)
            }
            (Value::Str(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::from(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

/// `(name, message)` when the object is an error instance
pub fn error_parts(obj: &JsObject) -> Option<(String, String)> {
    let class = obj.class.as_ref()?;
    if !class.is_error() {
        return None;
    }
    let name = obj
        .get("name")
        .map(|n| n.to_js_string())
        .unwrap_or_else(|| class.name.clone());
    let message = obj.get("message").map(|m| m.to_js_string()).unwrap_or_default();
    Some((name, message))
}

/// Console rendering, close to what browser consoles print
pub fn inspect(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        other => inspect_nested(other, 0),
    }
}

fn inspect_nested(value: &Value, depth: usize) -> String {
    match value {
        Value::Str(s) => format!("'{}'", s),
        Value::Array(items) => {
            if depth > 2 {
                return "[Array]".to_string();
            }
            let items = items.borrow();
            if items.is_empty() {
                return "[]".to_string();
            }
            let parts: Vec<String> = items.iter().map(|v| inspect_nested(v, depth + 1)).collect();
            format!("[ {} ]", parts.join(", "))
        }
        Value::Object(obj) => {
            let obj = obj.borrow();
            if let Some((name, message)) = error_parts(&obj) {
                return if message.is_empty() {
                    name
                } else {
                    format!("{}: {}", name, message)
                };
            }
            if depth > 2 {
                return "[Object]".to_string();
            }
            let prefix = obj
                .class
                .as_ref()
                .map(|class| format!("{} ", class.name))
                .unwrap_or_default();
            if obj.props.is_empty() && obj.accessors.is_empty() {
                return format!("{}{{}}", prefix);
            }
            let parts: Vec<String> = obj
                .props
                .iter()
                .map(|(key, v)| format!("{}: {}", key, inspect_nested(v, depth + 1)))
                .chain(
                    obj.accessors
                        .iter()
                        .map(|(key, accessor)| format!("{}: {}", key, accessor.label())),
                )
                .collect();
            format!("{}{{ {} }}", prefix, parts.join(", "))
        }
        Value::Function(closure) => {
            if closure.name.is_empty() {
                "[Function (anonymous)]".to_string()
            } else {
                format!("[Function: {}]", closure.name)
            }
        }
        Value::Native(native) => format!("[Function: {}]", native.name),
        Value::Class(class) => format!("[class {}]", class.name),
        Value::Promise(promise) => match &promise.borrow().settled {
            None => "Promise { <pending> }".to_string(),
            Some(Settled::Fulfilled(v)) => format!("Promise {{ {} }}", inspect_nested(v, depth + 1)),
            Some(Settled::Rejected(v)) => {
                format!("Promise {{ <rejected> {} }}", inspect_nested(v, depth + 1))
            }
        },
        other => other.to_js_string(),
    }
}

/// Getter and setter pair of one property
#[derive(Clone, Default)]
pub struct Accessor {
    pub get: Option<Value>,
    pub set: Option<Value>,
}

impl Accessor {
    /// Console rendering of the property
    fn label(&self) -> &'static str {
        match (&self.get, &self.set) {
            (Some(_), Some(_)) => "[Getter/Setter]",
            (Some(_), None) => "[Getter]",
            _ => "[Setter]",
        }
    }
}

/// Plain object or class instance
#[derive(Default)]
pub struct JsObject {
    /// Own properties in insertion order
    pub props: Vec<(String, Value)>,
    /// Own accessor properties from `get` / `set` in literals
    pub accessors: Vec<(String, Accessor)>,
    /// Class the object was constructed from
    pub class: Option<Rc<ClassValue>>,
}

impl JsObject {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.props.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key.to_string(), value)),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.props.iter().any(|(k, _)| k == key) || self.accessor(key).is_some()
    }

    pub fn accessor(&self, key: &str) -> Option<&Accessor> {
        self.accessors.iter().find(|(k, _)| k == key).map(|(_, a)| a)
    }

    /// Add one half of an accessor pair, replacing a data property
    pub fn define_accessor(&mut self, key: &str, getter: Option<Value>, setter: Option<Value>) {
        self.props.retain(|(k, _)| k != key);
        match self.accessors.iter_mut().find(|(k, _)| k == key) {
            Some((_, accessor)) => {
                if getter.is_some() {
                    accessor.get = getter;
                }
                if setter.is_some() {
                    accessor.set = setter;
                }
            }
            None => self.accessors.push((
                key.to_string(),
                Accessor {
                    get: getter,
                    set: setter,
                },
            )),
        }
    }

    /// Plain data write that drops an accessor of the same name
    pub fn define(&mut self, key: &str, value: Value) {
        self.accessors.retain(|(k, _)| k != key);
        self.set(key, value);
    }
}

/// User function together with its defining environment
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Scope,
    pub name: String,
    /// Lexical `this` captured by arrow functions
    pub this_value: Option<Value>,
    /// Class a method was defined in, for `super`
    pub home: Option<Weak<ClassValue>>,
}

impl Closure {
    pub fn home_class(&self) -> Option<Rc<ClassValue>> {
        self.home.as_ref().and_then(Weak::upgrade)
    }
}

pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
    pub captures: Vec<Value>,
}

pub struct ClassValue {
    pub name: String,
    pub parent: Option<Rc<ClassValue>>,
    pub constructor: Option<Rc<Closure>>,
    pub methods: Vec<(String, Rc<Closure>)>,
    /// Instance `get` / `set` members
    pub accessors: Vec<(String, Accessor)>,
    pub statics: RefCell<Vec<(String, Value)>>,
    /// Root of the builtin error hierarchy
    pub builtin_error: bool,
}

impl ClassValue {
    /// Instance method lookup through the inheritance chain
    pub fn find_method(&self, name: &str) -> Option<Rc<Closure>> {
        if let Some((_, method)) = self.methods.iter().find(|(n, _)| n == name) {
            return Some(method.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_method(name))
    }

    /// Instance accessor lookup through the inheritance chain
    pub fn find_accessor(&self, name: &str) -> Option<Accessor> {
        if let Some((_, accessor)) = self.accessors.iter().find(|(n, _)| n == name) {
            return Some(accessor.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_accessor(name))
    }

    /// Static member lookup through the inheritance chain
    pub fn find_static(&self, name: &str) -> Option<Value> {
        if let Some((_, value)) = self.statics.borrow().iter().find(|(n, _)| n == name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_static(name))
    }

    pub fn is_error(&self) -> bool {
        self.builtin_error || self.parent.as_ref().is_some_and(|p| p.is_error())
    }

    pub fn inherits_from(self: &Rc<Self>, other: &Rc<ClassValue>) -> bool {
        if Rc::ptr_eq(self, other) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.inherits_from(other))
    }
}

#[derive(Clone)]
pub enum Settled {
    Fulfilled(Value),
    Rejected(Value),
}

/// What runs when a promise settles
#[derive(Clone)]
pub enum ReactionKind {
    Then {
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    },
    Finally(Option<Value>),
    /// Settle the target with the same outcome (promise resolved with a promise)
    Adopt,
    /// One slot of `Promise.all`
    AllElement {
        index: usize,
        values: ArrayRef,
        remaining: Rc<RefCell<usize>>,
    },
    /// Continue an async activation parked at `await`
    Resume(Continuation),
}

#[derive(Clone)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub target: PromiseRef,
}

#[derive(Default)]
pub struct PromiseState {
    pub settled: Option<Settled>,
    pub reactions: Vec<Reaction>,
    /// A reaction was ever attached
    pub handled: bool,
}

/// Variable binding
struct Binding {
    value: Value,
    mutable: bool,
}

struct ScopeData {
    vars: HashMap<String, Binding>,
    parent: Option<Scope>,
    /// Function (or global) scope: target of `var`
    function_scope: bool,
}

/// Lexical environment with a parent chain
#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeData>>);

/// Failure to assign a binding
#[derive(Debug, PartialEq, Eq)]
pub enum AssignError {
    Undeclared,
    Constant,
}

impl Scope {
    pub fn global() -> Self {
        Scope(Rc::new(RefCell::new(ScopeData {
            vars: HashMap::new(),
            parent: None,
            function_scope: true,
        })))
    }

    pub fn child(&self, function_scope: bool) -> Self {
        Scope(Rc::new(RefCell::new(ScopeData {
            vars: HashMap::new(),
            parent: Some(self.clone()),
            function_scope,
        })))
    }

    /// Declare in this scope, shadowing outer bindings
    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .borrow_mut()
            .vars
            .insert(name.to_string(), Binding { value, mutable });
    }

    /// Declare in the nearest function scope (`var`), keeping an existing value
    /// when `value` is `None`
    pub fn declare_var(&self, name: &str, value: Option<Value>) {
        let mut scope = self.clone();
        loop {
            let next = {
                let data = scope.0.borrow();
                if data.function_scope {
                    None
                } else {
                    data.parent.clone()
                }
            };
            match next {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        let mut data = scope.0.borrow_mut();
        match (data.vars.get_mut(name), value) {
            (Some(binding), Some(value)) => binding.value = value,
            (Some(_), None) => {}
            (None, value) => {
                data.vars.insert(
                    name.to_string(),
                    Binding {
                        value: value.unwrap_or(Value::Undefined),
                        mutable: true,
                    },
                );
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        match data.vars.get(name) {
            Some(binding) => Some(binding.value.clone()),
            None => data.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), AssignError> {
        let mut data = self.0.borrow_mut();
        match data.vars.get_mut(name) {
            Some(binding) if !binding.mutable => Err(AssignError::Constant),
            Some(binding) => {
                binding.value = value;
                Ok(())
            }
            None => match &data.parent {
                Some(parent) => parent.assign(name, value),
                None => Err(AssignError::Undeclared),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing_and_assignment() {
        let global = Scope::global();
        global.declare("x", Value::Number(1.0), true);
        let inner = global.child(false);
        inner.declare("y", Value::Number(2.0), false);

        assert!(inner.assign("x", Value::Number(5.0)).is_ok());
        assert_eq!(global.lookup("x").unwrap().to_number(), 5.0);
        assert_eq!(inner.assign("y", Value::Null), Err(AssignError::Constant));
        assert_eq!(inner.assign("z", Value::Null), Err(AssignError::Undeclared));
    }

    #[test]
    fn test_var_hoists_to_function_scope() {
        let function = Scope::global().child(true);
        let block = function.child(false);
        block.declare_var("v", Some(Value::Bool(true)));
        assert!(function.lookup("v").unwrap().truthy());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::Number(3.0).to_js_string(), "3");
        assert_eq!(Value::array(vec![1.0.into(), Value::Null, "a".into()]).to_js_string(), "1,,a");
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("").to_number() == 0.0);
        assert_eq!(inspect(&Value::object(vec![("a".into(), "x".into())])), "{ a: 'x' }");
    }

    #[test]
    fn test_accessors_replace_data_properties() {
        let mut obj = JsObject::default();
        obj.set("x", Value::Number(1.0));
        obj.define_accessor("x", Some(Value::Null), None);
        obj.define_accessor("x", None, Some(Value::Null));
        assert!(obj.get("x").is_none());
        assert!(obj.has("x"));
        let accessor = obj.accessor("x").unwrap();
        assert!(accessor.get.is_some() && accessor.set.is_some());

        obj.define("x", Value::Number(2.0));
        assert!(obj.accessor("x").is_none());
        let value = Value::Object(Rc::new(RefCell::new(obj)));
        assert_eq!(inspect(&value), "{ x: 2 }");
    }

    #[test]
    fn test_regex_values() {
        let regex = Value::Regex(Rc::new(RegexValue::compile("a+", "g").unwrap()));
        assert_eq!(regex.type_of(), "object");
        assert_eq!(regex.to_js_string(), "/a+/g");
        assert!(regex.strict_equals(&regex.clone()));
    }
}
