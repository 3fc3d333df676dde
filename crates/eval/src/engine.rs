//! Rhai engine setup, script bindings and error-to-frame conversion.
//!
//! Everything engine-specific lives here so the rest of the pipeline only
//! sees [`RaisedError`]s and rendered values.

use std::sync::Arc;

use {
    evalbot_config::EvaluatorConfig,
    rhai::{
        AST, Dynamic, Engine, EvalAltResult, INT, ImmutableString, ParseError, Position, Scope,
        packages::{Package, StandardPackage},
    },
    tokio::runtime::Handle,
    tracing::debug,
};

use crate::{
    environment::{Binding, Environment},
    traceback::{Frame, MAIN_FUNCTION, RaisedError},
    transport::ScriptOutbound,
};

/// The `bot` value scripts see. Calls block the engine thread until the
/// transport future resolves.
#[derive(Clone)]
pub(crate) struct BotHandle {
    outbound: Arc<dyn ScriptOutbound>,
    runtime: Handle,
}

impl BotHandle {
    fn block_on<T>(
        &self,
        function: &'static str,
        call: impl Future<Output = crate::Result<T>>,
    ) -> Result<T, Box<EvalAltResult>> {
        self.runtime
            .block_on(call)
            .map_err(|e| BindingFault::raise(function, e.to_string()))
    }
}

/// Error payload thrown by a binding when the host side fails.
#[derive(Debug, Clone)]
pub(crate) struct BindingFault {
    function: &'static str,
    file: &'static str,
    line: u32,
    message: String,
}

impl BindingFault {
    #[track_caller]
    fn raise(function: &'static str, message: String) -> Box<EvalAltResult> {
        let location = std::panic::Location::caller();
        let fault = Self {
            function,
            file: location.file(),
            line: location.line(),
            message,
        };
        EvalAltResult::ErrorRuntime(Dynamic::from(fault), Position::NONE).into()
    }
}

fn message_id(function: &'static str, id: INT) -> Result<i64, Box<EvalAltResult>> {
    if id <= 0 || id > INT::from(i32::MAX) {
        return Err(BindingFault::raise(
            function,
            format!("invalid message id: {id}"),
        ));
    }
    Ok(id)
}

pub(crate) fn build_engine(config: &EvaluatorConfig) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());
    engine.set_strict_variables(config.strict_variables);
    // Fast operators return built-in errors without a position; the regular
    // call path stamps the operator's position on them.
    engine.set_fast_operators(false);
    register_bot(&mut engine);
    engine
}

fn register_bot(engine: &mut Engine) {
    engine.register_type_with_name::<BotHandle>("Bot");

    engine.register_fn(
        "send_message",
        |bot: &mut BotHandle, chat_id: INT, text: ImmutableString| -> Result<INT, Box<EvalAltResult>> {
            bot.block_on(
                "send_message",
                bot.outbound.send_message(chat_id, text.as_str()),
            )
        },
    );
    engine.register_fn(
        "reply",
        |bot: &mut BotHandle,
         chat_id: INT,
         message: INT,
         text: ImmutableString|
         -> Result<INT, Box<EvalAltResult>> {
            let message = message_id("reply", message)?;
            bot.block_on(
                "reply",
                bot.outbound.reply(chat_id, message, text.as_str()),
            )
        },
    );
    engine.register_fn(
        "edit_message",
        |bot: &mut BotHandle,
         chat_id: INT,
         message: INT,
         text: ImmutableString|
         -> Result<(), Box<EvalAltResult>> {
            let message = message_id("edit_message", message)?;
            bot.block_on(
                "edit_message",
                bot.outbound.edit_message(chat_id, message, text.as_str()),
            )
        },
    );
    engine.register_fn(
        "delete_message",
        |bot: &mut BotHandle, chat_id: INT, message: INT| -> Result<(), Box<EvalAltResult>> {
            let message = message_id("delete_message", message)?;
            bot.block_on(
                "delete_message",
                bot.outbound.delete_message(chat_id, message),
            )
        },
    );
}

/// Compile and run `script` against `environment`.
///
/// Returns the rendering of the final value (`None` for unit). Errors carry
/// this function's plumbing frames followed by the script's own frames.
pub(crate) fn run_script(
    config: &EvaluatorConfig,
    script: &str,
    environment: Environment,
    runtime: Handle,
) -> Result<Option<String>, RaisedError> {
    let mut plumbing = vec![Frame::host("run_script")];
    let mut engine = build_engine(config);
    let mut scope = Scope::new();

    for (name, binding) in environment.bindings() {
        match binding {
            Binding::Value(value) => match rhai::serde::to_dynamic(value) {
                Ok(dynamic) => {
                    scope.push_dynamic(name, dynamic);
                },
                Err(err) => {
                    plumbing.push(Frame::host("bind"));
                    return Err(RaisedError {
                        frames: plumbing,
                        kind: "BindingError".into(),
                        message: format!("cannot bind `{name}`: {err}"),
                    });
                },
            },
            Binding::Unit => {
                scope.push_dynamic(name, Dynamic::UNIT);
            },
            Binding::Print(sink) => {
                let print_sink = sink.clone();
                engine.on_print(move |text| print_sink.write_line(text));
                let debug_sink = sink.clone();
                engine.on_debug(move |text, _source, _pos| debug_sink.write_line(text));
            },
            Binding::Transport(outbound) => {
                scope.push(name, BotHandle {
                    outbound: Arc::clone(outbound),
                    runtime: runtime.clone(),
                });
            },
        }
    }

    let source = config.snippet_source.as_str();
    let ast: AST = match engine.compile_with_scope(&scope, script) {
        Ok(mut ast) => {
            ast.set_source(source);
            ast
        },
        Err(err) => {
            plumbing.push(Frame::host("compile"));
            let mut raised = raised_from_parse(&err, script, source);
            plumbing.append(&mut raised.frames);
            raised.frames = plumbing;
            return Err(raised);
        },
    };

    debug!(script_len = script.len(), source, "script compiled");

    match engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
        Ok(value) if value.is_unit() => Ok(None),
        Ok(value) => Ok(Some(value.to_string())),
        Err(err) => {
            plumbing.push(Frame::host("eval"));
            let mut raised = raised_from_eval(&err, script, source);
            plumbing.append(&mut raised.frames);
            raised.frames = plumbing;
            Err(raised)
        },
    }
}

fn script_frame(file: &str, pos: Position, function: &str, script: &str, snippet: &str) -> Frame {
    let line = pos.line();
    let mut frame = Frame::new(file, line, function);
    if file == snippet
        && let Some(text) = line.and_then(|n| script.lines().nth(n.saturating_sub(1)))
    {
        frame = frame.with_source_line(text);
    }
    frame
}

pub(crate) fn raised_from_parse(err: &ParseError, script: &str, snippet: &str) -> RaisedError {
    RaisedError {
        frames: vec![script_frame(
            snippet,
            err.position(),
            MAIN_FUNCTION,
            script,
            snippet,
        )],
        kind: "SyntaxError".into(),
        message: err.err_type().to_string(),
    }
}

/// Walk the nested call chain of `err`, outermost call first.
pub(crate) fn raised_from_eval(err: &EvalAltResult, script: &str, snippet: &str) -> RaisedError {
    let mut frames = Vec::new();
    let mut function = MAIN_FUNCTION.to_string();
    let mut current = err;

    let innermost = loop {
        match current {
            EvalAltResult::ErrorInFunctionCall(name, source, inner, pos) => {
                let file = if source.is_empty() {
                    snippet
                } else {
                    source.as_str()
                };
                frames.push(script_frame(file, *pos, &function, script, snippet));
                function = name.clone();
                current = inner.as_ref();
            },
            EvalAltResult::ErrorInModule(path, inner, pos) => {
                frames.push(script_frame(snippet, *pos, &function, script, snippet));
                function = path.clone();
                current = inner.as_ref();
            },
            other => {
                frames.push(script_frame(
                    snippet,
                    other.position(),
                    &function,
                    script,
                    snippet,
                ));
                break other;
            },
        }
    };

    if let EvalAltResult::ErrorRuntime(value, _) = innermost
        && let Some(fault) = value.clone().try_cast::<BindingFault>()
    {
        frames.push(Frame::new(
            fault.file,
            Some(fault.line as usize),
            fault.function,
        ));
        return RaisedError {
            frames,
            kind: "TransportError".into(),
            message: fault.message,
        };
    }

    let (kind, message) = classify(innermost);
    RaisedError {
        frames,
        kind: kind.into(),
        message,
    }
}

/// Error class name and position-free message for the innermost error.
fn classify(err: &EvalAltResult) -> (&'static str, String) {
    match err {
        EvalAltResult::ErrorArithmetic(msg, _) => {
            if msg.starts_with("Division by zero") || msg.starts_with("Modulo division by zero") {
                ("ZeroDivisionError", "division by zero".into())
            } else {
                ("ArithmeticError", msg.clone())
            }
        },
        EvalAltResult::ErrorRuntime(value, _) => {
            let message = if value.is_unit() {
                String::new()
            } else {
                value.to_string()
            };
            ("RuntimeError", message)
        },
        EvalAltResult::ErrorParsing(..) => ("SyntaxError", without_position(err)),
        EvalAltResult::ErrorVariableNotFound(..) | EvalAltResult::ErrorPropertyNotFound(..) => {
            ("NameError", without_position(err))
        },
        EvalAltResult::ErrorFunctionNotFound(..) => ("FunctionNotFoundError", without_position(err)),
        EvalAltResult::ErrorMismatchDataType(..)
        | EvalAltResult::ErrorMismatchOutputType(..)
        | EvalAltResult::ErrorIndexingType(..) => ("TypeError", without_position(err)),
        EvalAltResult::ErrorArrayBounds(..) | EvalAltResult::ErrorStringBounds(..) => {
            ("IndexError", without_position(err))
        },
        EvalAltResult::ErrorStackOverflow(..) => ("RecursionError", without_position(err)),
        _ => ("ScriptError", without_position(err)),
    }
}

/// `err`'s display text without the trailing ` (line N, position M)`.
fn without_position(err: &EvalAltResult) -> String {
    let text = err.to_string();
    let suffix = format!(" ({})", err.position());
    match text.strip_suffix(&suffix) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = "<snippet>";

    fn eval_err(script: &str) -> Box<EvalAltResult> {
        let engine = build_engine(&EvaluatorConfig::default());
        let mut ast = engine.compile(script).unwrap();
        ast.set_source(SNIPPET);
        engine
            .eval_ast_with_scope::<Dynamic>(&mut Scope::new(), &ast)
            .unwrap_err()
    }

    #[test]
    fn division_by_zero_is_named() {
        let script = "let x = 1;\nx / 0";
        let raised = raised_from_eval(&eval_err(script), script, SNIPPET);
        assert_eq!(raised.kind, "ZeroDivisionError");
        assert_eq!(raised.message, "division by zero");
        assert_eq!(raised.frames.len(), 1);
        assert_eq!(raised.frames[0].line, Some(2));
        assert_eq!(raised.frames[0].source_line.as_deref(), Some("x / 0"));
    }

    #[test]
    fn operator_errors_inside_functions_keep_their_line() {
        let script = "fn halve(x) {\n  let y = x + 1;\n  y % 0\n}\nhalve(4)";
        let raised = raised_from_eval(&eval_err(script), script, SNIPPET);
        let last = raised.frames.last().unwrap();
        assert_eq!(last.function, "halve");
        assert_eq!(last.line, Some(3));
        assert_eq!(last.source_line.as_deref(), Some("  y % 0"));
        assert_eq!(raised.frames[0].line, Some(5));
    }

    #[test]
    fn compound_assignment_errors_keep_their_line() {
        let script = "let x = 1;\nx /= 0;";
        let raised = raised_from_eval(&eval_err(script), script, SNIPPET);
        assert_eq!(raised.kind, "ZeroDivisionError");
        assert_eq!(raised.frames[0].line, Some(2));
    }

    #[test]
    fn nested_calls_become_frames() {
        let script = "fn inner(x) { x / 0 }\nfn outer(x) { inner(x) }\nouter(3)";
        let raised = raised_from_eval(&eval_err(script), script, SNIPPET);
        let functions: Vec<_> = raised.frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(functions, vec!["<main>", "outer", "inner"]);
        assert!(raised.frames.iter().all(|f| f.file == SNIPPET));
        assert_eq!(raised.frames[0].line, Some(3));
        assert_eq!(raised.kind, "ZeroDivisionError");
    }

    #[test]
    fn thrown_value_is_runtime_error() {
        let script = r#"throw "boom""#;
        let raised = raised_from_eval(&eval_err(script), script, SNIPPET);
        assert_eq!(raised.kind, "RuntimeError");
        assert_eq!(raised.message, "boom");
    }

    #[test]
    fn unknown_variable_is_name_error_without_position() {
        let script = "missing + 1";
        let raised = raised_from_eval(&eval_err(script), script, SNIPPET);
        assert_eq!(raised.kind, "NameError");
        assert!(raised.message.contains("missing"), "{}", raised.message);
        assert!(!raised.message.contains("line 1"), "{}", raised.message);
    }

    #[test]
    fn parse_error_is_syntax_error_at_script_line() {
        let engine = build_engine(&EvaluatorConfig::default());
        let script = "let a = 1;\nlet = ;";
        let err = engine.compile(script).unwrap_err();
        let raised = raised_from_parse(&err, script, SNIPPET);
        assert_eq!(raised.kind, "SyntaxError");
        assert_eq!(raised.frames[0].file, SNIPPET);
        assert_eq!(raised.frames[0].line, Some(2));
    }

    #[test]
    fn out_of_range_message_id_faults() {
        let err = message_id("reply", 0).unwrap_err();
        let raised = raised_from_eval(&err, "", SNIPPET);
        assert_eq!(raised.kind, "TransportError");
        assert_eq!(raised.message, "invalid message id: 0");
        let host = raised.frames.last().unwrap();
        assert_eq!(host.function, "reply");
        assert!(host.file.ends_with("engine.rs"), "{}", host.file);
    }
}
