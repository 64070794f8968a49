//! Methods of arrays, strings, numbers, regular expressions and promises.
//!
//! Property access on one of these receivers hands out a builtin that
//! carries the method name as its capture; the receiver arrives as `this`.

use super::interpreter::Interpreter;
use super::promise::new_promise;
use super::regexp::{self, RegexValue};
use super::value::*;
use crate::script::printer::format_number;
use std::rc::Rc;

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "slice", "splice", "concat", "join", "indexOf",
    "includes", "reverse", "forEach", "map", "filter", "find", "findIndex", "some", "every",
    "reduce", "sort", "toString",
];

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "includes", "startsWith", "endsWith", "indexOf", "slice",
    "substring", "split", "trim", "trimStart", "trimEnd", "repeat", "padStart", "padEnd",
    "charAt", "charCodeAt", "replace", "replaceAll", "concat", "toString", "match", "search",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

const PROMISE_METHODS: &[&str] = &["then", "catch", "finally"];

const REGEX_METHODS: &[&str] = &["test", "exec", "toString"];

fn lookup(names: &[&str], key: &str, func: NativeFn) -> Option<Value> {
    names
        .contains(&key)
        .then(|| Value::native_with(key, func, vec![Value::from(key)]))
}

pub fn array_method(key: &str) -> Option<Value> {
    lookup(ARRAY_METHODS, key, array_call)
}

pub fn string_method(key: &str) -> Option<Value> {
    lookup(STRING_METHODS, key, string_call)
}

pub fn number_method(key: &str) -> Option<Value> {
    lookup(NUMBER_METHODS, key, number_call)
}

pub fn promise_method(key: &str) -> Option<Value> {
    lookup(PROMISE_METHODS, key, promise_call)
}

pub fn regex_method(key: &str) -> Option<Value> {
    lookup(REGEX_METHODS, key, regex_call)
}

/// Resolve a possibly negative position against `len`
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            other => other.to_js_string(),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn require_callable(interp: &Interpreter, value: &Value) -> Result<(), Abrupt> {
    if value.is_callable() {
        Ok(())
    } else {
        Err(interp.throw(
            "TypeError",
            format!("{} is not a function", inspect(value)),
        ))
    }
}

// -------------------------------------------------------------------
// Arrays
// -------------------------------------------------------------------

fn array_call(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let Value::Array(items) = call.this.clone() else {
        return Err(interp.throw("TypeError", "Array method called on incompatible receiver"));
    };
    let method = call.capture(0).to_js_string();

    let result = match method.as_str() {
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(call.args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
        "shift" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        "unshift" => {
            let mut items = items.borrow_mut();
            for (offset, value) in call.args.iter().enumerate() {
                items.insert(offset, value.clone());
            }
            Value::Number(items.len() as f64)
        }
        "slice" => {
            let items = items.borrow();
            let start = relative_index(&call.arg(0), items.len(), 0);
            let end = relative_index(&call.arg(1), items.len(), items.len());
            Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "splice" => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let start = relative_index(&call.arg(0), len, 0);
            let count = match call.args.len() {
                0 => 0,
                1 => len - start,
                _ => {
                    let n = call.arg(1).to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len - start)
                    }
                }
            };
            let inserted: Vec<Value> = call.args.iter().skip(2).cloned().collect();
            let removed: Vec<Value> = items.splice(start..start + count, inserted).collect();
            Value::array(removed)
        }
        "concat" => {
            let mut out = items.borrow().clone();
            for arg in &call.args {
                match arg {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::array(out)
        }
        "join" | "toString" => {
            let separator = match call.arg(0) {
                Value::Undefined => ",".to_string(),
                other if method == "join" => other.to_js_string(),
                _ => ",".to_string(),
            };
            Value::from(join(&items.borrow(), &separator))
        }
        "indexOf" => {
            let needle = call.arg(0);
            let position = items.borrow().iter().position(|v| v.strict_equals(&needle));
            Value::Number(position.map(|i| i as f64).unwrap_or(-1.0))
        }
        "includes" => {
            let needle = call.arg(0);
            Value::Bool(items.borrow().iter().any(|v| same_value_zero(v, &needle)))
        }
        "reverse" => {
            items.borrow_mut().reverse();
            call.this.clone()
        }
        "reduce" => return reduce(interp, &items, &call),
        "sort" => {
            sort(interp, &items, &call.arg(0))?;
            call.this.clone()
        }
        _ => return iterate(interp, &items, &method, &call),
    };
    Ok(result)
}

/// Callback-driven methods; the callback sees `(item, index, array)`
fn iterate(interp: &mut Interpreter, items: &ArrayRef, method: &str, call: &NativeCall) -> EvalResult {
    let callback = call.arg(0);
    require_callable(interp, &callback)?;

    let len = items.borrow().len();
    let mut collected = Vec::new();
    for index in 0..len {
        let Some(item) = items.borrow().get(index).cloned() else {
            break;
        };
        let verdict = interp.call_function(
            &callback,
            Value::Undefined,
            vec![item.clone(), Value::Number(index as f64), call.this.clone()],
        )?;
        match method {
            "map" => collected.push(verdict),
            "filter" if verdict.truthy() => collected.push(item),
            "find" if verdict.truthy() => return Ok(item),
            "findIndex" if verdict.truthy() => return Ok(Value::Number(index as f64)),
            "some" if verdict.truthy() => return Ok(Value::Bool(true)),
            "every" if !verdict.truthy() => return Ok(Value::Bool(false)),
            _ => {}
        }
    }

    Ok(match method {
        "map" | "filter" => Value::array(collected),
        "findIndex" => Value::Number(-1.0),
        "some" => Value::Bool(false),
        "every" => Value::Bool(true),
        _ => Value::Undefined,
    })
}

fn reduce(interp: &mut Interpreter, items: &ArrayRef, call: &NativeCall) -> EvalResult {
    let callback = call.arg(0);
    require_callable(interp, &callback)?;

    let len = items.borrow().len();
    let (mut accumulator, start) = if call.args.len() > 1 {
        (call.arg(1), 0)
    } else {
        match items.borrow().first() {
            Some(first) => (first.clone(), 1),
            None => {
                return Err(interp.throw(
                    "TypeError",
                    "Reduce of empty array with no initial value",
                ))
            }
        }
    };
    for index in start..len {
        let Some(item) = items.borrow().get(index).cloned() else {
            break;
        };
        accumulator = interp.call_function(
            &callback,
            Value::Undefined,
            vec![accumulator, item, Value::Number(index as f64), call.this.clone()],
        )?;
    }
    Ok(accumulator)
}

/// Stable insertion sort; the comparator may call back into script code
fn sort(interp: &mut Interpreter, items: &ArrayRef, comparator: &Value) -> Result<(), Abrupt> {
    let mut sorted = items.borrow().clone();
    for i in 1..sorted.len() {
        let mut j = i;
        while j > 0 {
            let order = match comparator {
                Value::Undefined => {
                    let (a, b) = (sorted[j - 1].to_js_string(), sorted[j].to_js_string());
                    if a > b {
                        1.0
                    } else {
                        0.0
                    }
                }
                _ => interp
                    .call_function(
                        comparator,
                        Value::Undefined,
                        vec![sorted[j - 1].clone(), sorted[j].clone()],
                    )?
                    .to_number(),
            };
            if order > 0.0 {
                sorted.swap(j - 1, j);
                j -= 1;
            } else {
                break;
            }
        }
    }
    *items.borrow_mut() = sorted;
    Ok(())
}

// -------------------------------------------------------------------
// Strings
// -------------------------------------------------------------------

fn string_call(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let Value::Str(text) = call.this.clone() else {
        return Err(interp.throw("TypeError", "String method called on incompatible receiver"));
    };
    let method = call.capture(0).to_js_string();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let arg = call.arg(0);
    let needle = arg.to_js_string();

    if let Value::Regex(regex) = &arg {
        if matches!(method.as_str(), "replace" | "replaceAll" | "match" | "search" | "split") {
            return string_regex_call(interp, &text, &method, regex, &call);
        }
    }

    let result = match method.as_str() {
        "toUpperCase" => Value::from(text.to_uppercase()),
        "toLowerCase" => Value::from(text.to_lowercase()),
        "includes" => Value::Bool(text.contains(needle.as_str())),
        "startsWith" => Value::Bool(text.starts_with(needle.as_str())),
        "endsWith" => Value::Bool(text.ends_with(needle.as_str())),
        "indexOf" => Value::Number(
            text.find(needle.as_str())
                .map(|byte| text[..byte].chars().count() as f64)
                .unwrap_or(-1.0),
        ),
        "slice" => {
            let start = relative_index(&arg, len, 0);
            let end = relative_index(&call.arg(1), len, len);
            Value::from(chars[start..end.max(start)].iter().collect::<String>())
        }
        "substring" => {
            let clamp = |value: &Value, default: usize| match value {
                Value::Undefined => default,
                other => {
                    let n = other.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let (a, b) = (clamp(&arg, 0), clamp(&call.arg(1), len));
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::from(chars[start..end].iter().collect::<String>())
        }
        "split" => {
            let parts: Vec<Value> = match &arg {
                Value::Undefined => vec![Value::Str(text.clone())],
                _ if needle.is_empty() => chars.iter().map(|c| Value::from(c.to_string())).collect(),
                _ => text.split(needle.as_str()).map(Value::from).collect(),
            };
            Value::array(parts)
        }
        "trim" => Value::from(text.trim()),
        "trimStart" => Value::from(text.trim_start()),
        "trimEnd" => Value::from(text.trim_end()),
        "repeat" => {
            let count = arg.to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(interp.throw("RangeError", format!("Invalid count value: {}", format_number(count))));
            }
            let count = if count.is_nan() { 0 } else { count as usize };
            Value::from(text.repeat(count))
        }
        "padStart" | "padEnd" => {
            let target = arg.to_number();
            let target = if target.is_nan() || target < 0.0 {
                0
            } else {
                target as usize
            };
            let fill = match call.arg(1) {
                Value::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            if target <= len || fill.is_empty() {
                Value::Str(text.clone())
            } else {
                let padding: String = fill.chars().cycle().take(target - len).collect();
                if method == "padStart" {
                    Value::from(format!("{}{}", padding, text))
                } else {
                    Value::from(format!("{}{}", text, padding))
                }
            }
        }
        "charAt" => {
            let index = relative_index(&arg, len, 0);
            Value::from(chars.get(index).map(|c| c.to_string()).unwrap_or_default())
        }
        "charCodeAt" => {
            let index = relative_index(&arg, len, 0);
            Value::Number(chars.get(index).map(|c| *c as u32 as f64).unwrap_or(f64::NAN))
        }
        "replace" | "replaceAll" => return replace(interp, &text, &needle, call.arg(1), method == "replaceAll"),
        "match" | "search" => {
            let source = if matches!(arg, Value::Undefined) { "(?:)".to_string() } else { needle };
            let regex = RegexValue::compile(&source, "")
                .map_err(|message| interp.throw("SyntaxError", message))?;
            return string_regex_call(interp, &text, &method, &Rc::new(regex), &call);
        }
        "concat" => {
            let mut out = text.to_string();
            for part in &call.args {
                out.push_str(&part.to_js_string());
            }
            Value::from(out)
        }
        _ => Value::Str(text.clone()),
    };
    Ok(result)
}

fn replace(interp: &mut Interpreter, text: &str, pattern: &str, replacement: Value, all: bool) -> EvalResult {
    let mut out = String::new();
    let mut rest = text;
    loop {
        let Some(at) = rest.find(pattern) else {
            break;
        };
        out.push_str(&rest[..at]);
        let piece = if replacement.is_callable() {
            interp
                .call_function(&replacement, Value::Undefined, vec![Value::from(pattern)])?
                .to_js_string()
        } else {
            replacement.to_js_string()
        };
        out.push_str(&piece);
        rest = &rest[at + pattern.len()..];
        if !all || pattern.is_empty() {
            break;
        }
    }
    out.push_str(rest);
    Ok(Value::from(out))
}

// -------------------------------------------------------------------
// Regular expressions
// -------------------------------------------------------------------

fn match_value(caps: &regex::Captures) -> Value {
    Value::array(
        regexp::groups(caps)
            .into_iter()
            .map(|group| group.map(Value::from).unwrap_or(Value::Undefined))
            .collect(),
    )
}

fn regex_call(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let method = call.capture(0).to_js_string();
    let Value::Regex(regex) = call.this.clone() else {
        return Err(interp.throw(
            "TypeError",
            format!("Method RegExp.prototype.{} called on incompatible receiver", method),
        ));
    };
    let text = call.arg(0).to_js_string();
    let result = match method.as_str() {
        "test" => Value::Bool(regex.exec_at(&text).is_some()),
        "exec" => regex
            .exec_at(&text)
            .map_or(Value::Null, |caps| match_value(&caps)),
        _ => Value::from(regex.display()),
    };
    Ok(result)
}

/// `replace`, `replaceAll`, `match`, `search` and `split` with a pattern
fn string_regex_call(
    interp: &mut Interpreter,
    text: &str,
    method: &str,
    regex: &Rc<RegexValue>,
    call: &NativeCall,
) -> EvalResult {
    let compiled = &regex.compiled;
    let result = match method {
        "search" => compiled
            .find(text)
            .map_or(Value::Number(-1.0), |m| {
                Value::Number(regexp::char_offset(text, m.start()) as f64)
            }),
        "split" => Value::array(compiled.split(text).map(Value::from).collect()),
        "match" if regex.global() => {
            regex.last_index.set(0);
            let found: Vec<Value> = compiled
                .find_iter(text)
                .map(|m| Value::from(m.as_str()))
                .collect();
            if found.is_empty() {
                Value::Null
            } else {
                Value::array(found)
            }
        }
        "match" => {
            let found = compiled.captures(text);
            found.map_or(Value::Null, |caps| match_value(&caps))
        }
        _ => {
            let all = method == "replaceAll";
            if all && !regex.global() {
                return Err(interp.throw(
                    "TypeError",
                    "replaceAll must be called with a global RegExp",
                ));
            }
            let replacement = call.arg(1);
            let mut out = String::new();
            let mut last = 0;
            for caps in compiled.captures_iter(text) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };
                out.push_str(&text[last..whole.start()]);
                if replacement.is_callable() {
                    let mut args: Vec<Value> = regexp::groups(&caps)
                        .into_iter()
                        .map(|group| group.map(Value::from).unwrap_or(Value::Undefined))
                        .collect();
                    args.push(Value::Number(regexp::char_offset(text, whole.start()) as f64));
                    args.push(Value::from(text));
                    let piece = interp.call_function(&replacement, Value::Undefined, args)?;
                    out.push_str(&piece.to_js_string());
                } else {
                    out.push_str(&regexp::expand(&replacement.to_js_string(), &caps, text));
                }
                last = whole.end();
                if !regex.global() {
                    break;
                }
            }
            out.push_str(&text[last..]);
            Value::from(out)
        }
    };
    Ok(result)
}

// -------------------------------------------------------------------
// Numbers and promises
// -------------------------------------------------------------------

fn number_call(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let Value::Number(n) = call.this else {
        return Err(interp.throw("TypeError", "Number method called on incompatible receiver"));
    };
    if call.capture(0).as_str() == Some("toFixed") {
        let digits = call.arg(0).to_number();
        if !(0.0..=100.0).contains(&digits) {
            return Err(interp.throw("RangeError", "toFixed() digits argument must be between 0 and 100"));
        }
        if !n.is_finite() {
            return Ok(Value::from(format_number(n)));
        }
        return Ok(Value::from(format!("{:.*}", digits as usize, n)));
    }

    let radix = match call.arg(0) {
        Value::Undefined => 10,
        other => other.to_number() as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(interp.throw("RangeError", "toString() radix must be between 2 and 36"));
    }
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return Ok(Value::from(format_number(n)));
    }
    Ok(Value::from(integer_in_radix(n, radix)))
}

fn integer_in_radix(n: f64, radix: u32) -> String {
    let mut magnitude = n.abs() as u64;
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % radix as u64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= radix as u64;
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn promise_call(interp: &mut Interpreter, call: NativeCall) -> EvalResult {
    let method = call.capture(0).to_js_string();
    let Value::Promise(promise) = call.this.clone() else {
        return Err(interp.throw(
            "TypeError",
            format!("Method Promise.prototype.{} called on incompatible receiver", method),
        ));
    };

    let target = match method.as_str() {
        "then" => interp.promise_then(&promise, Some(call.arg(0)), Some(call.arg(1))),
        "catch" => interp.promise_then(&promise, None, Some(call.arg(0))),
        _ => {
            let target = new_promise();
            interp.add_reaction(
                &promise,
                Reaction {
                    kind: ReactionKind::Finally(Some(call.arg(0))),
                    target: target.clone(),
                },
            );
            target
        }
    };
    Ok(Value::Promise(target))
}
