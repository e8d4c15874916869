//! Sandbox page rendering
//!
//! The page is self-contained: it embeds the script source, the merged env,
//! the encoded body, and a Pyodide bootstrap. Everything that can go wrong
//! inside it — interpreter bootstrap failure, a script exception, even a
//! window-level error — funnels into one `report()` call against the
//! completion endpoint. A page that never calls back would leave the host
//! waiting forever, so the catch-all is the load-bearing part of this
//! template.

use super::payload;
use toolgate_application::RuntimeError;

/// Inputs for one rendered page.
#[derive(Debug, Clone)]
pub struct PageInputs<'a> {
    /// Script source to execute
    pub source: &'a str,
    /// Merged environment map
    pub env: &'a std::collections::HashMap<String, String>,
    /// JSON body fed to the script as stdin
    pub body: &'a serde_json::Value,
    /// URL of the interpreter bundle (Pyodide loader)
    pub interpreter_url: &'a str,
    /// Completion endpoint the page POSTs its result to
    pub done_url: &'a str,
}

/// Render the self-contained sandbox page.
pub fn render_page(inputs: &PageInputs<'_>) -> Result<String, RuntimeError> {
    let env_value = serde_json::to_value(inputs.env)
        .map_err(|e| RuntimeError::Encoding(e.to_string()))?;
    let env_b64 = payload::encode_json(&env_value)?;
    let body_b64 = payload::encode_json(inputs.body)?;
    let source_b64 = payload::encode_text(inputs.source);

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>toolgate sandbox</title>
<script src="{interpreter_url}"></script>
</head>
<body>
<script>
const DONE_URL = "{done_url}";
const ENV_B64 = "{env_b64}";
const BODY_B64 = "{body_b64}";
const SOURCE_B64 = "{source_b64}";

function b64decode(encoded) {{
    return new TextDecoder().decode(Uint8Array.from(atob(encoded), c => c.charCodeAt(0)));
}}

let reported = false;
async function report(result) {{
    if (reported) return;
    reported = true;
    try {{
        await fetch(DONE_URL, {{
            method: "POST",
            headers: {{"Content-Type": "application/json"}},
            body: JSON.stringify(result),
        }});
    }} catch (e) {{
        // The host resolves abandoned operations on its side; nothing more
        // the page can do.
    }}
}}

window.addEventListener("error", (event) => {{
    report({{stdout: "", stderr: "", error: String(event.message || event)}});
}});
window.addEventListener("unhandledrejection", (event) => {{
    report({{stdout: "", stderr: "", error: String(event.reason)}});
}});

(async () => {{
    let stdoutText = "";
    let stderrText = "";
    try {{
        if (typeof loadPyodide !== "function") {{
            throw new Error("interpreter bootstrap failed: loadPyodide is missing");
        }}
        const py = await loadPyodide();
        py.setStdout({{batched: (line) => {{ stdoutText += line + "\n"; }}}});
        py.setStderr({{batched: (line) => {{ stderrText += line + "\n"; }}}});

        const env = JSON.parse(b64decode(ENV_B64));
        py.globals.set("_tool_env", py.toPy(env));
        py.globals.set("_tool_stdin", b64decode(BODY_B64));
        py.runPython(
            "import io, os, sys\n" +
            "os.environ.update(_tool_env)\n" +
            "sys.stdin = io.StringIO(_tool_stdin)\n" +
            "del _tool_env, _tool_stdin\n"
        );

        await py.runPythonAsync(b64decode(SOURCE_B64));
        await report({{stdout: stdoutText, stderr: stderrText, error: null}});
    }} catch (err) {{
        await report({{stdout: stdoutText, stderr: stderrText, error: String(err)}});
    }}
}})();
</script>
</body>
</html>
"#,
        interpreter_url = inputs.interpreter_url,
        done_url = inputs.done_url,
        env_b64 = env_b64,
        body_b64 = body_b64,
        source_b64 = source_b64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_render_embeds_all_payloads() {
        let mut env = HashMap::new();
        env.insert("SLACK_BOT_TOKEN".to_string(), "xoxb-1".to_string());
        let body = serde_json::json!({"text": "hi"});

        let html = render_page(&PageInputs {
            source: "print(input())",
            env: &env,
            body: &body,
            interpreter_url: "https://cdn.example/pyodide/pyodide.js",
            done_url: "http://127.0.0.1:8400/sandbox/scripts/op-1/done",
        })
        .unwrap();

        assert!(html.contains("https://cdn.example/pyodide/pyodide.js"));
        assert!(html.contains("/sandbox/scripts/op-1/done"));
        assert!(html.contains(&payload::encode_text("print(input())")));
        // Raw secrets never appear in the page text, only encoded payloads
        assert!(!html.contains("xoxb-1"));
    }

    #[test]
    fn test_render_has_page_level_catch_all() {
        let html = render_page(&PageInputs {
            source: "raise RuntimeError('x')",
            env: &HashMap::new(),
            body: &serde_json::Value::Null,
            interpreter_url: "https://cdn.example/pyodide.js",
            done_url: "http://127.0.0.1:8400/sandbox/scripts/op-2/done",
        })
        .unwrap();

        // Every failure path must still call back
        assert!(html.contains(r#"window.addEventListener("error""#));
        assert!(html.contains(r#"window.addEventListener("unhandledrejection""#));
        assert!(html.contains("catch (err)"));
        assert!(html.contains("interpreter bootstrap failed"));
    }
}
