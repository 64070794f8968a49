//! Global environment of the sandbox.
//!
//! Installs the trace hooks, console, timers, promises, error classes and
//! the small standard library scripts expect. Statics of callable globals
//! (`Promise.all`, `Object.keys`, ...) are resolved by name on access.

use super::interpreter::{power, Interpreter};
use super::promise::new_promise;
use super::regexp::RegexValue;
use super::value::*;
use crate::protocol::EventKind;
use crate::script::printer::format_number;
use crate::utils::config::{GLOBAL_RECEIVERS, MIN_INTERVAL_MS, TRACE_HOOK};
use chrono::Utc;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub use super::methods::{array_method, number_method, promise_method, regex_method, string_method};

/// Prefix marking callables produced by `__trace.bind`
const BOUND_PREFIX: &str = "bound ";

const ERROR_CLASSES: &[&str] = &[
    "TypeError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
];

/// Populate the global scope
///
/// **Public** - called once per interpreter
pub fn install(interp: &mut Interpreter) {
    install_errors(interp);

    let global = interp.global.clone();
    let define = |name: &str, value: Value| global.declare(name, value, true);

    define(
        TRACE_HOOK,
        Value::object(vec![
            entry("enter", Value::native("enter", trace_enter)),
            entry("exit", Value::native("exit", trace_exit)),
            entry("bind", Value::native("bind", trace_bind)),
        ]),
    );

    let console = Value::object(
        [
            ("log", ""),
            ("info", ""),
            ("debug", ""),
            ("warn", "[warn] "),
            ("error", "[error] "),
        ]
        .iter()
        .map(|(name, prefix)| {
            entry(
                name,
                Value::native_with(name, console_write, vec![Value::from(*prefix)]),
            )
        })
        .collect(),
    );
    define("console", console.clone());

    let set_timeout = Value::native("setTimeout", set_timeout);
    let set_interval = Value::native("setInterval", set_interval);
    let clear_timeout = Value::native("clearTimeout", clear_timer);
    let clear_interval = Value::native("clearInterval", clear_timer);
    define("setTimeout", set_timeout.clone());
    define("setInterval", set_interval.clone());
    define("clearTimeout", clear_timeout.clone());
    define("clearInterval", clear_interval.clone());

    let promise = Value::native("Promise", promise_constructor);
    define("Promise", promise.clone());

    // One object stands in for every global receiver
    let window = Value::object(vec![
        entry("setTimeout", set_timeout),
        entry("setInterval", set_interval),
        entry("clearTimeout", clear_timeout),
        entry("clearInterval", clear_interval),
        entry("console", console),
        entry("Promise", promise),
    ]);
    for receiver in GLOBAL_RECEIVERS {
        define(receiver, window.clone());
    }

    define(
        "Math",
        table(
            &[
                "floor", "ceil", "round", "trunc", "abs", "sign", "sqrt", "pow", "min", "max",
                "random",
            ],
            math,
        ),
    );
    if let Value::Object(math) = global.lookup("Math").unwrap_or(Value::Undefined) {
        let mut math = math.borrow_mut();
        math.set("PI", Value::Number(std::f64::consts::PI));
        math.set("E", Value::Number(std::f64::consts::E));
    }
    define("JSON", table(&["stringify", "parse"], json));

    for name in [
        "Object", "Array", "Number", "String", "Boolean", "Date", "Function",
    ] {
        define(name, Value::native_with(name, conversion, vec![Value::from(name)]));
    }
    define("RegExp", Value::native("RegExp", regexp_constructor));
    define("parseInt", Value::native("parseInt", parse_int));
    define("parseFloat", Value::native("parseFloat", parse_float));
    define("isNaN", Value::native("isNaN", is_nan));
    define("isFinite", Value::native("isFinite", is_finite));
    define("eval", Value::native("eval", global_eval));
    define("NaN", Value::Number(f64::NAN));
    define("Infinity", Value::Number(f64::INFINITY));
}

fn entry(name: &str, value: Value) -> (String, Value) {
    (name.to_string(), value)
}

/// Object whose members all dispatch to `func` by name
fn table(names: &[&str], func: NativeFn) -> Value {
    Value::object(
        names
            .iter()
            .map(|name| entry(name, Value::native_with(name, func, vec![Value::from(*name)])))
            .collect(),
    )
}

fn install_errors(interp: &mut Interpreter) {
    let base = Rc::new(ClassValue {
        name: "Error".to_string(),
        parent: None,
        constructor: None,
        methods: Vec::new(),
        accessors: Vec::new(),
        statics: RefCell::new(Vec::new()),
        builtin_error: true,
    });
    interp
        .global
        .declare("Error", Value::Class(base.clone()), true);
    interp.error_classes.insert("Error", base.clone());

    for name in ERROR_CLASSES {
        let class = Rc::new(ClassValue {
            name: name.to_string(),
            parent: Some(base.clone()),
            constructor: None,
            methods: Vec::new(),
            accessors: Vec::new(),
            statics: RefCell::new(Vec::new()),
            builtin_error: true,
        });
        interp.global.declare(name, Value::Class(class.clone()), true);
        interp.error_classes.insert(*name, class);
    }
}

/// Static members of callable globals
pub fn native_static(owner: &str, key: &str) -> Option<Value> {
    let func: NativeFn = match (owner, key) {
        ("Promise", "resolve" | "reject" | "all") => promise_static,
        ("Object", "keys" | "values" | "entries" | "assign" | "freeze") => object_static,
        ("Array", "isArray" | "from" | "of") => array_static,
        ("Number", "isInteger" | "isFinite" | "isNaN") => number_static,
        ("Number", "parseInt") => parse_int,
        ("Number", "parseFloat") => parse_float,
        ("Number", "MAX_SAFE_INTEGER") => return Some(Value::Number(9007199254740991.0)),
        ("Date", "now") => date_now,
        _ => return None,
    };
    Some(Value::native_with(key, func, vec![Value::from(key)]))
}

fn method_name(call: &NativeCall) -> String {
    call.capture(0).to_js_string()
}

// -------------------------------------------------------------------
// Trace hooks
// -------------------------------------------------------------------

fn trace_enter(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let name = call.arg(0).to_js_string();
    let kind = call
        .arg(1)
        .as_str()
        .and_then(EventKind::from_label)
        .unwrap_or(EventKind::Function);
    Ok(Value::from(interp.tracer.enter(&name, kind)))
}

fn trace_exit(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    if let Value::Str(id) = call.arg(0) {
        interp.tracer.exit(&id);
    }
    Ok(Value::Undefined)
}

/// Capture the current activation as parent of a later callback
fn trace_bind(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let target = call.arg(0);
    if !target.is_callable() {
        return Ok(target);
    }
    let parent = interp
        .tracer
        .current()
        .map(Value::from)
        .unwrap_or(Value::Undefined);
    let name = match &target {
        Value::Function(closure) => closure.name.clone(),
        Value::Native(native) => native.name.clone(),
        _ => String::new(),
    };
    Ok(Value::native_with(
        &format!("{}{}", BOUND_PREFIX, name),
        trace_bound,
        vec![target, call.arg(1), parent],
    ))
}

fn trace_bound(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let target = call.capture(0);
    let parent = match call.capture(2) {
        Value::Str(id) => Some(id),
        _ => None,
    };
    if let Some(id) = &parent {
        interp.tracer.restore(id);
    }

    let result = match &target {
        // Builtins carry no hooks of their own
        Value::Native(native) if !native.name.starts_with(BOUND_PREFIX) => {
            let name = if native.name.is_empty() {
                call.capture(1).to_js_string()
            } else {
                native.name.clone()
            };
            let id = interp.tracer.enter(&name, EventKind::Call);
            let result = interp.call_function(&target, call.this, call.args);
            interp.tracer.exit(&id);
            result
        }
        _ => interp.call_function(&target, call.this, call.args),
    };

    if let Some(id) = &parent {
        interp.tracer.release(id);
    }
    result
}

// -------------------------------------------------------------------
// Console and timers
// -------------------------------------------------------------------

fn console_write(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let line: Vec<String> = call.args.iter().map(inspect).collect();
    let prefix = call.capture(0).to_js_string();
    interp.emitter().log(format!("{}{}", prefix, line.join(" ")));
    Ok(Value::Undefined)
}

fn set_timeout(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    schedule(interp, call, false)
}

fn set_interval(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    schedule(interp, call, true)
}

fn schedule(interp: &mut Interpreter, call: NativeCall, repeat: bool) -> EvalResult {
    let callback = call.arg(0);
    if !callback.is_callable() {
        return Err(interp.throw(
            "TypeError",
            format!(
                "The \"callback\" argument must be of type function. Received {}",
                inspect(&callback)
            ),
        ));
    }
    let requested = call.arg(1).to_number();
    let millis = if requested.is_finite() && requested > 0.0 {
        requested as u64
    } else {
        0
    };
    let delay = Duration::from_millis(millis.max(MIN_INTERVAL_MS));
    let args = call.args.iter().skip(2).cloned().collect();
    let id = interp
        .event_loop
        .add_timer(callback, delay, args, repeat.then_some(delay));
    debug!("Scheduled timer {} in {:?}", id, delay);
    Ok(Value::Number(id as f64))
}

fn clear_timer(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    if let Value::Number(id) = call.arg(0) {
        if id >= 1.0 {
            interp.event_loop.clear_timer(id as u64);
        }
    }
    Ok(Value::Undefined)
}

// -------------------------------------------------------------------
// Promise
// -------------------------------------------------------------------

fn promise_constructor(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let executor = call.arg(0);
    if !executor.is_callable() {
        return Err(interp.throw(
            "TypeError",
            format!("Promise resolver {} is not a function", inspect(&executor)),
        ));
    }
    let promise = new_promise();
    let resolve = Value::native_with("resolve", settle_fn, vec![Value::Promise(promise.clone()), Value::Bool(true)]);
    let reject = Value::native_with("reject", settle_fn, vec![Value::Promise(promise.clone()), Value::Bool(false)]);
    match interp.call_function(&executor, Value::Undefined, vec![resolve, reject]) {
        Ok(_) => {}
        Err(Abrupt::Throw(error)) => interp.reject_promise(&promise, error),
        Err(halted) => return Err(halted),
    }
    Ok(Value::Promise(promise))
}

/// Resolving functions handed to a promise executor
fn settle_fn(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    if let Value::Promise(promise) = call.capture(0) {
        if call.capture(1).truthy() {
            interp.resolve_promise(&promise, call.arg(0));
        } else {
            interp.reject_promise(&promise, call.arg(0));
        }
    }
    Ok(Value::Undefined)
}

fn promise_static(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    match method_name(&call).as_str() {
        "resolve" => Ok(Value::Promise(interp.promise_of(call.arg(0)))),
        "reject" => {
            let promise = new_promise();
            interp.reject_promise(&promise, call.arg(0));
            Ok(Value::Promise(promise))
        }
        _ => {
            let Value::Array(items) = call.arg(0) else {
                return Err(interp.throw(
                    "TypeError",
                    format!("{} is not iterable", inspect(&call.arg(0))),
                ));
            };
            let items = items.borrow().clone();
            let target = new_promise();
            if items.is_empty() {
                interp.resolve_promise(&target, Value::array(Vec::new()));
                return Ok(Value::Promise(target));
            }
            let values = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
            let remaining = Rc::new(RefCell::new(items.len()));
            for (index, item) in items.into_iter().enumerate() {
                let source = interp.promise_of(item);
                interp.add_reaction(
                    &source,
                    Reaction {
                        kind: ReactionKind::AllElement {
                            index,
                            values: values.clone(),
                            remaining: remaining.clone(),
                        },
                        target: target.clone(),
                    },
                );
            }
            Ok(Value::Promise(target))
        }
    }
}

// -------------------------------------------------------------------
// Math and JSON
// -------------------------------------------------------------------

fn math(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let x = call.arg(0).to_number();
    let numbers = || call.args.iter().map(Value::to_number);
    let result = match method_name(&call).as_str() {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => (x + 0.5).floor(),
        "trunc" => x.trunc(),
        "abs" => x.abs(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "pow" => power(x, call.arg(1).to_number()),
        "min" => numbers().fold(f64::INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() {
                f64::NAN
            } else {
                acc.min(n)
            }
        }),
        "max" => numbers().fold(f64::NEG_INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() {
                f64::NAN
            } else {
                acc.max(n)
            }
        }),
        _ => rand::random::<f64>(),
    };
    Ok(Value::Number(result))
}

fn json(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    if method_name(&call) == "parse" {
        let text = call.arg(0).to_js_string();
        return match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(parsed) => Ok(from_json(&parsed)),
            Err(e) => Err(interp.throw("SyntaxError", format!("Unexpected token in JSON: {}", e))),
        };
    }

    let indent = match call.arg(2) {
        Value::Number(n) if n >= 1.0 => " ".repeat((n as usize).min(10)),
        Value::Str(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    match stringify(&call.arg(0), &indent, "", 0) {
        Ok(Some(text)) => Ok(Value::from(text)),
        Ok(None) => Ok(Value::Undefined),
        Err(message) => Err(interp.throw("TypeError", message)),
    }
}

const MAX_JSON_DEPTH: usize = 100;

/// JSON text of a value, `None` for values JSON omits
fn stringify(value: &Value, indent: &str, current: &str, depth: usize) -> Result<Option<String>, String> {
    if depth > MAX_JSON_DEPTH {
        return Err("Converting circular structure to JSON".to_string());
    }
    let inner = format!("{}{}", current, indent);
    let text = match value {
        Value::Undefined | Value::Function(_) | Value::Native(_) | Value::Class(_) => return Ok(None),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_finite() => format_number(*n),
        Value::Number(_) => "null".to_string(),
        Value::Str(s) => json_quote(s),
        Value::Array(items) => {
            let mut parts = Vec::new();
            for item in items.borrow().iter() {
                parts.push(stringify(item, indent, &inner, depth + 1)?.unwrap_or_else(|| "null".to_string()));
            }
            wrap(parts, '[', ']', indent, current)
        }
        Value::Object(obj) => {
            let separator = if indent.is_empty() { ":" } else { ": " };
            let mut parts = Vec::new();
            for (key, item) in obj.borrow().props.iter() {
                if let Some(text) = stringify(item, indent, &inner, depth + 1)? {
                    parts.push(format!("{}{}{}", json_quote(key), separator, text));
                }
            }
            wrap(parts, '{', '}', indent, current)
        }
        Value::Promise(_) | Value::Regex(_) => "{}".to_string(),
    };
    Ok(Some(text))
}

fn wrap(parts: Vec<String>, open: char, close: char, indent: &str, current: &str) -> String {
    if parts.is_empty() {
        return format!("{}{}", open, close);
    }
    if indent.is_empty() {
        return format!("{}{}{}", open, parts.join(","), close);
    }
    let inner = format!("{}{}", current, indent);
    format!(
        "{}\n{}{}\n{}{}",
        open,
        inner,
        parts.join(&format!(",\n{}", inner)),
        current,
        close
    )
}

fn json_quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.iter()
                .map(|(key, item)| (key.clone(), from_json(item)))
                .collect(),
        ),
    }
}

// -------------------------------------------------------------------
// Callable globals
// -------------------------------------------------------------------

/// `Object(x)`, `Array(...)`, `Number(x)`, `String(x)`, `Boolean(x)`,
/// `Date()` and `Function(...)` called as plain functions
fn conversion(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let arg = call.arg(0);
    let result = match method_name(&call).as_str() {
        "Object" if arg.is_nullish() => Value::object(Vec::new()),
        "Object" => arg,
        "Array" => match (call.args.len(), &arg) {
            (1, Value::Number(n)) => {
                if *n < 0.0 || n.fract() != 0.0 {
                    return Err(interp.throw("RangeError", "Invalid array length"));
                }
                Value::array(vec![Value::Undefined; *n as usize])
            }
            _ => Value::array(call.args.clone()),
        },
        "Number" if call.args.is_empty() => Value::Number(0.0),
        "Number" => Value::Number(arg.to_number()),
        "String" if call.args.is_empty() => Value::from(""),
        "String" => Value::from(arg.to_js_string()),
        "Boolean" => Value::Bool(arg.truthy()),
        "Date" => Value::from(Utc::now().to_rfc3339()),
        _ => {
            let mut parts: Vec<String> = call.args.iter().map(Value::to_js_string).collect();
            let body = parts.pop().unwrap_or_default();
            return interp.function_from_source(&parts, &body);
        }
    };
    Ok(result)
}

// -------------------------------------------------------------------
// Numbers and dynamic code
// -------------------------------------------------------------------

fn parse_int(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let text = call.arg(0).to_js_string();
    let mut text = text.trim();
    let mut sign = 1.0;
    if let Some(rest) = text.strip_prefix('-') {
        sign = -1.0;
        text = rest;
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest;
    }

    let mut radix = match call.arg(1) {
        Value::Undefined => 10,
        other => other.to_number() as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if radix == 16 || call.arg(1).is_nullish() {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            text = rest;
            radix = 16;
        }
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }

    let mut result: Option<f64> = None;
    for c in text.chars() {
        match c.to_digit(radix) {
            Some(digit) => result = Some(result.unwrap_or(0.0) * radix as f64 + digit as f64),
            None => break,
        }
    }
    Ok(Value::Number(result.map(|n| sign * n).unwrap_or(f64::NAN)))
}

fn parse_float(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let text = call.arg(0).to_js_string();
    let text = text.trim_start();
    for (prefix, value) in [("Infinity", f64::INFINITY), ("+Infinity", f64::INFINITY), ("-Infinity", f64::NEG_INFINITY)] {
        if text.starts_with(prefix) {
            return Ok(Value::Number(value));
        }
    }
    let candidate: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .collect();
    let parsed = (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok());
    Ok(Value::Number(parsed.unwrap_or(f64::NAN)))
}

fn is_nan(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    Ok(Value::Bool(call.arg(0).to_number().is_nan()))
}

fn is_finite(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    Ok(Value::Bool(call.arg(0).to_number().is_finite()))
}

fn number_static(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let Value::Number(n) = call.arg(0) else {
        return Ok(Value::Bool(false));
    };
    let result = match method_name(&call).as_str() {
        "isInteger" => n.is_finite() && n.fract() == 0.0,
        "isFinite" => n.is_finite(),
        _ => n.is_nan(),
    };
    Ok(Value::Bool(result))
}

fn date_now(_interp: &mut Interpreter, _call: NativeCall) -> EvalResult {
    Ok(Value::Number(Utc::now().timestamp_millis() as f64))
}

/// `RegExp(pattern, flags)`, with or without `new`
fn regexp_constructor(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let (source, inherited) = match call.arg(0) {
        Value::Regex(regex) => (regex.source.clone(), regex.flags.clone()),
        Value::Undefined => ("(?:)".to_string(), String::new()),
        other => (other.to_js_string(), String::new()),
    };
    let flags = match call.arg(1) {
        Value::Undefined => inherited,
        other => other.to_js_string(),
    };
    match RegexValue::compile(&source, &flags) {
        Ok(regex) => Ok(Value::Regex(Rc::new(regex))),
        Err(message) => Err(interp.throw("SyntaxError", message)),
    }
}

/// Indirect `eval`: runs untraced in a scope below the globals
fn global_eval(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    match call.arg(0) {
        Value::Str(source) => interp.eval_source(&source),
        other => Ok(other),
    }
}

fn object_static(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let target = call.arg(0);
    let method = method_name(&call);
    if method == "freeze" {
        return Ok(target);
    }
    if method == "assign" {
        let Value::Object(obj) = &target else {
            return Err(interp.throw("TypeError", "Cannot convert undefined or null to object"));
        };
        for source in call.args.iter().skip(1) {
            for (key, value) in own_entries(source) {
                obj.borrow_mut().set(&key, value);
            }
        }
        return Ok(target);
    }
    if target.is_nullish() {
        return Err(interp.throw("TypeError", "Cannot convert undefined or null to object"));
    }

    let entries = own_entries(&target);
    let result = entries
        .into_iter()
        .map(|(key, value)| match method.as_str() {
            "keys" => Value::from(key),
            "values" => value,
            _ => Value::array(vec![Value::from(key), value]),
        })
        .collect();
    Ok(Value::array(result))
}

/// Enumerable own `(key, value)` pairs; accessors are left out
pub(crate) fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(obj) => obj.borrow().props.clone(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::from(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn array_static(_interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let result = match method_name(&call).as_str() {
        "isArray" => Value::Bool(matches!(call.arg(0), Value::Array(_))),
        "of" => Value::array(call.args.clone()),
        _ => Value::array(own_entries(&call.arg(0)).into_iter().map(|(_, v)| v).collect()),
    };
    Ok(result)
}
