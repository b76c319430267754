// trampoline.rs - Signature-checked calls from native code into script
//
// Arguments are checked against the signature before the runtime is touched.
// Results: none -> return ignored, one -> the return value, several -> the
// function must return an array of exactly that length.

use rquickjs::convert::Coerced;
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, FromJs, Function, IntoJs, Value};
use tracing::debug;

use crate::error::{BridgeError, Faults, ScriptError};
use crate::signature::{MarshalError, Signature, ValueKind};

/// A primitive value that crosses the native/script boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Number(f64),
    Integer(i32),
    Text(String),
}

impl ScriptValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ScriptValue::Number(_) => ValueKind::Number,
            ScriptValue::Integer(_) => ValueKind::Integer,
            ScriptValue::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            ScriptValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScriptValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl<'js> IntoJs<'js> for ScriptValue {
    fn into_js(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            ScriptValue::Number(n) => n.into_js(ctx),
            ScriptValue::Integer(i) => i.into_js(ctx),
            ScriptValue::Text(s) => s.into_js(ctx),
        }
    }
}

/// Ordered argument list for a script call.
///
/// ```ignore
/// let args = CallArgs::new().text("a").text("b");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    values: Vec<ScriptValue>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number(mut self, value: f64) -> Self {
        self.values.push(ScriptValue::Number(value));
        self
    }

    pub fn integer(mut self, value: i32) -> Self {
        self.values.push(ScriptValue::Integer(value));
        self
    }

    pub fn text(mut self, value: impl Into<String>) -> Self {
        self.values.push(ScriptValue::Text(value.into()));
        self
    }

    pub fn push(&mut self, value: ScriptValue) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[ScriptValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<ScriptValue> for CallArgs {
    fn from_iter<I: IntoIterator<Item = ScriptValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Where the function lives: a global, or a member of a global table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionPath {
    Global(String),
    Method { table: String, name: String },
}

type ErrorHandler = Box<dyn Fn(ScriptError) -> Result<Vec<ScriptValue>, BridgeError>>;

/// A named script function with a fixed signature.
pub struct ScriptFunction {
    path: FunctionPath,
    signature: Signature,
    on_error: Option<ErrorHandler>,
}

impl ScriptFunction {
    pub fn global(name: impl Into<String>, signature: &str) -> Result<Self, BridgeError> {
        Ok(Self::with_signature(FunctionPath::Global(name.into()), Signature::parse(signature)?))
    }

    /// A function stored on a global table; it is called with the table as `this`.
    pub fn method(table: impl Into<String>, name: impl Into<String>, signature: &str) -> Result<Self, BridgeError> {
        let path = FunctionPath::Method {
            table: table.into(),
            name: name.into(),
        };
        Ok(Self::with_signature(path, Signature::parse(signature)?))
    }

    pub fn with_signature(path: FunctionPath, signature: Signature) -> Self {
        Self {
            path,
            signature,
            on_error: None,
        }
    }

    /// Recover from script errors instead of propagating them.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(ScriptError) -> Result<Vec<ScriptValue>, BridgeError> + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn label(&self) -> String {
        match &self.path {
            FunctionPath::Global(name) => name.clone(),
            FunctionPath::Method { table, name } => format!("{table}.{name}"),
        }
    }

    pub fn exists(&self, ctx: &Ctx<'_>) -> bool {
        matches!(self.locate(ctx), Ok(Some(_)))
    }

    pub fn call<'js>(&self, ctx: &Ctx<'js>, faults: &Faults, args: &CallArgs) -> Result<Vec<ScriptValue>, BridgeError> {
        self.check_args(args)?;
        let values = args
            .values()
            .iter()
            .cloned()
            .map(|value| value.into_js(ctx))
            .collect::<rquickjs::Result<Vec<_>>>()?;

        let returned = match self.call_raw(ctx, faults, values) {
            Ok(returned) => returned,
            Err(BridgeError::Script(error)) => {
                return match &self.on_error {
                    Some(handler) => {
                        let recovered = handler(error)?;
                        self.check_recovered(&recovered)?;
                        Ok(recovered)
                    }
                    None => Err(error.into()),
                }
            }
            Err(error) => return Err(error),
        };
        self.collect_results(ctx, returned)
    }

    /// Call without argument or result marshaling.
    pub fn call_raw<'js>(
        &self,
        ctx: &Ctx<'js>,
        faults: &Faults,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>, BridgeError> {
        let (function, this) = self.locate(ctx)?.ok_or_else(|| BridgeError::FunctionNotFound { name: self.label() })?;
        invoke(ctx, faults, &self.label(), &function, this, args)
    }

    fn locate<'js>(&self, ctx: &Ctx<'js>) -> Result<Option<(Function<'js>, Value<'js>)>, BridgeError> {
        let globals = ctx.globals();
        match &self.path {
            FunctionPath::Global(name) => {
                let value: Value = globals.get(name.as_str())?;
                Ok(value
                    .into_function()
                    .map(|function| (function, Value::new_undefined(ctx.clone()))))
            }
            FunctionPath::Method { table, name } => {
                let value: Value = globals.get(table.as_str())?;
                let Some(table) = value.into_object() else {
                    return Ok(None);
                };
                let member: Value = table.get(name.as_str())?;
                Ok(member.into_function().map(|function| (function, table.into_value())))
            }
        }
    }

    fn check_args(&self, args: &CallArgs) -> Result<(), MarshalError> {
        let expected = &self.signature.args;
        if args.len() != expected.len() {
            return Err(MarshalError::ArgumentCount {
                expected: expected.len(),
                found: args.len(),
            });
        }
        for (index, (value, &kind)) in args.values().iter().zip(expected).enumerate() {
            if value.kind() != kind {
                return Err(MarshalError::ArgumentMismatch {
                    index,
                    expected: kind,
                    found: value.kind(),
                });
            }
        }
        Ok(())
    }

    /// Values from the error handler must match the result kinds.
    fn check_recovered(&self, values: &[ScriptValue]) -> Result<(), MarshalError> {
        let expected = &self.signature.results;
        if values.len() != expected.len() {
            return Err(MarshalError::ResultCount {
                expected: expected.len(),
                found: values.len(),
            });
        }
        for (index, (value, &kind)) in values.iter().zip(expected).enumerate() {
            if value.kind() != kind {
                return Err(MarshalError::ResultMismatch {
                    index,
                    expected: kind,
                    found: value.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    fn collect_results<'js>(&self, ctx: &Ctx<'js>, returned: Value<'js>) -> Result<Vec<ScriptValue>, BridgeError> {
        let expected = &self.signature.results;
        match expected.as_slice() {
            [] => Ok(Vec::new()),
            [kind] => Ok(vec![convert_result(ctx, 0, *kind, returned)?]),
            _ => {
                let Some(array) = returned.as_array() else {
                    return Err(MarshalError::ResultCount {
                        expected: expected.len(),
                        found: 1,
                    }
                    .into());
                };
                if array.len() != expected.len() {
                    return Err(MarshalError::ResultCount {
                        expected: expected.len(),
                        found: array.len(),
                    }
                    .into());
                }
                expected
                    .iter()
                    .enumerate()
                    .map(|(index, &kind)| {
                        let value: Value = array.get(index)?;
                        convert_result(ctx, index, kind, value)
                    })
                    .collect()
            }
        }
    }
}

/// Call `function` and map a thrown exception to a bridge error.
pub(crate) fn invoke<'js>(
    ctx: &Ctx<'js>,
    faults: &Faults,
    label: &str,
    function: &Function<'js>,
    this: Value<'js>,
    args: Vec<Value<'js>>,
) -> Result<Value<'js>, BridgeError> {
    faults.clear();
    function.call::<_, Value>((This(this), Rest(args))).map_err(|error| {
        let error = faults.resolve(ctx, label, error);
        debug!(function = label, %error, "Script call failed");
        error
    })
}

/// Text view of a script value: strings as-is, numbers formatted the way
/// the runtime formats them.
pub(crate) fn text_of<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Option<String>> {
    if let Some(text) = value.as_string() {
        return text.to_string().map(Some);
    }
    if value.is_number() {
        return Coerced::<String>::from_js(ctx, value.clone()).map(|text| Some(text.0));
    }
    Ok(None)
}

fn convert_result<'js>(
    ctx: &Ctx<'js>,
    index: usize,
    kind: ValueKind,
    value: Value<'js>,
) -> Result<ScriptValue, BridgeError> {
    let converted = match kind {
        ValueKind::Number => value.as_number().map(ScriptValue::Number),
        ValueKind::Integer => value.as_number().and_then(integer_of).map(ScriptValue::Integer),
        ValueKind::Text => text_of(ctx, &value)?.map(ScriptValue::Text),
    };
    converted.ok_or_else(|| {
        let found = match value.as_number() {
            Some(n) => format!("number {n}"),
            None => value.type_name().to_string(),
        };
        MarshalError::ResultMismatch {
            index,
            expected: kind,
            found,
        }
        .into()
    })
}

/// Truncate toward zero; NaN, infinities and values outside `i32` have no
/// integer form.
fn integer_of(n: f64) -> Option<i32> {
    let truncated = n.trunc();
    if truncated.is_finite() && truncated >= f64::from(i32::MIN) && truncated <= f64::from(i32::MAX) {
        Some(truncated as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptRuntime;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SCRIPT: &str = r#"
        function concat(a, b) { return a + b; }
        function half(n) { return n / 2; }
        function answer() { return 42; }
        function pair(a, b) { return [b, a]; }
        function wrong() { return {}; }
        function nan() { return NaN; }
        function huge() { return 1e12; }
        function negative() { return -2.9; }
        function fails(why) { throw new Error(why); }
        var Greeter = {
            prefix: "hi ",
            greet: function (name) { return this.prefix + name; }
        };
    "#;

    fn runtime() -> ScriptRuntime {
        let runtime = ScriptRuntime::new().unwrap();
        runtime.execute(SCRIPT).unwrap();
        runtime
    }

    fn call(runtime: &ScriptRuntime, function: &ScriptFunction, args: CallArgs) -> Result<Vec<ScriptValue>, BridgeError> {
        runtime.with(|ctx| function.call(&ctx, runtime.faults(), &args))
    }

    #[test]
    fn concatenates_two_texts() {
        let runtime = runtime();
        let concat = ScriptFunction::global("concat", "ss>s").unwrap();
        let results = call(&runtime, &concat, CallArgs::new().text("a").text("b")).unwrap();
        assert_eq!(results, [ScriptValue::Text("ab".into())]);
    }

    #[test]
    fn results_are_coerced_per_kind() {
        let runtime = runtime();

        let half_int = ScriptFunction::global("half", "d>i").unwrap();
        let results = call(&runtime, &half_int, CallArgs::new().number(7.0)).unwrap();
        assert_eq!(results, [ScriptValue::Integer(3)]);

        let answer_text = ScriptFunction::global("answer", ">s").unwrap();
        let results = call(&runtime, &answer_text, CallArgs::new()).unwrap();
        assert_eq!(results[0].as_text(), Some("42"));

        let pair = ScriptFunction::global("pair", "ii>ii").unwrap();
        let results = call(&runtime, &pair, CallArgs::new().integer(1).integer(2)).unwrap();
        assert_eq!(results, [ScriptValue::Integer(2), ScriptValue::Integer(1)]);

        let ignored = ScriptFunction::global("answer", "").unwrap();
        assert!(call(&runtime, &ignored, CallArgs::new()).unwrap().is_empty());
    }

    #[test]
    fn incompatible_results_are_marshal_errors() {
        let runtime = runtime();

        let wrong = ScriptFunction::global("wrong", ">i").unwrap();
        assert!(matches!(
            call(&runtime, &wrong, CallArgs::new()),
            Err(BridgeError::Marshal(MarshalError::ResultMismatch { index: 0, expected: ValueKind::Integer, .. }))
        ));

        for name in ["nan", "huge"] {
            let integer = ScriptFunction::global(name, ">i").unwrap();
            assert!(matches!(
                call(&runtime, &integer, CallArgs::new()),
                Err(BridgeError::Marshal(MarshalError::ResultMismatch { expected: ValueKind::Integer, .. }))
            ));
        }
        let negative = ScriptFunction::global("negative", ">i").unwrap();
        assert_eq!(call(&runtime, &negative, CallArgs::new()).unwrap(), [ScriptValue::Integer(-2)]);

        let answer_pair = ScriptFunction::global("answer", ">ii").unwrap();
        assert!(matches!(
            call(&runtime, &answer_pair, CallArgs::new()),
            Err(BridgeError::Marshal(MarshalError::ResultCount { expected: 2, found: 1 }))
        ));
    }

    #[test]
    fn arguments_are_checked_before_lookup() {
        let runtime = runtime();
        let missing = ScriptFunction::global("missing", "s").unwrap();

        assert!(matches!(
            call(&runtime, &missing, CallArgs::new()),
            Err(BridgeError::Marshal(MarshalError::ArgumentCount { expected: 1, found: 0 }))
        ));
        assert!(matches!(
            call(&runtime, &missing, CallArgs::new().integer(1)),
            Err(BridgeError::Marshal(MarshalError::ArgumentMismatch {
                index: 0,
                expected: ValueKind::Text,
                found: ValueKind::Integer
            }))
        ));
        assert!(matches!(
            call(&runtime, &missing, CallArgs::new().text("x")),
            Err(BridgeError::FunctionNotFound { name }) if name == "missing"
        ));
        assert!(!runtime.with(|ctx| missing.exists(&ctx)));
    }

    #[test]
    fn methods_receive_their_table_as_this() {
        let runtime = runtime();
        let greet = ScriptFunction::method("Greeter", "greet", "s>s").unwrap();
        assert!(runtime.with(|ctx| greet.exists(&ctx)));
        assert_eq!(greet.label(), "Greeter.greet");

        let results = call(&runtime, &greet, CallArgs::new().text("bob")).unwrap();
        assert_eq!(results[0].as_text(), Some("hi bob"));
    }

    #[test]
    fn script_errors_propagate_unless_handled() {
        let runtime = runtime();

        let fails = ScriptFunction::global("fails", "s").unwrap();
        match call(&runtime, &fails, CallArgs::new().text("nope")) {
            Err(BridgeError::Script(error)) => {
                assert_eq!(error.function, "fails");
                assert_eq!(error.message, "nope");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let recovering = ScriptFunction::global("fails", "s>i").unwrap().on_error(move |error| {
            log.borrow_mut().push(error.message);
            Ok(vec![ScriptValue::Integer(-1)])
        });
        let results = call(&runtime, &recovering, CallArgs::new().text("handled")).unwrap();
        assert_eq!(results, [ScriptValue::Integer(-1)]);
        assert_eq!(*seen.borrow(), ["handled"]);

        let wrong_kind = ScriptFunction::global("fails", "s>i")
            .unwrap()
            .on_error(|_| Ok(vec![ScriptValue::Text("oops".into())]));
        assert!(matches!(
            call(&runtime, &wrong_kind, CallArgs::new().text("x")),
            Err(BridgeError::Marshal(MarshalError::ResultMismatch { index: 0, expected: ValueKind::Integer, found }))
                if found == "text"
        ));

        let wrong_count = ScriptFunction::global("fails", "s>i").unwrap().on_error(|_| Ok(Vec::new()));
        assert!(matches!(
            call(&runtime, &wrong_count, CallArgs::new().text("x")),
            Err(BridgeError::Marshal(MarshalError::ResultCount { expected: 1, found: 0 }))
        ));
    }
}
