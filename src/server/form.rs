//! The single-page chat form: one text input, one text output.

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Chat</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
textarea, output { display: block; width: 100%; box-sizing: border-box; min-height: 6rem; padding: .5rem;
  border: 1px solid #ccc; border-radius: 4px; font: inherit; white-space: pre-wrap; }
button { margin: .75rem 0; padding: .4rem 1.2rem; }
.error { color: #b00020; }
</style>
</head>
<body>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the page. `output` is the last reply, `error` replaces it when the
/// turn failed.
pub fn render_page(model: &str, input: &str, output: Option<&str>, error: Option<&str>) -> String {
    let mut page = String::from(PAGE_HEAD);
    page.push_str(&format!("<h1>Chat with {}</h1>\n", escape_html(model)));
    page.push_str("<form method=\"post\">\n");
    page.push_str("<label for=\"input_text\">Input</label>\n");
    page.push_str(
        &format!(
            "<textarea id=\"input_text\" name=\"input_text\">{}</textarea>\n",
            escape_html(input)
        )
    );
    page.push_str("<button type=\"submit\">Submit</button>\n");
    page.push_str("</form>\n");
    page.push_str("<label for=\"output_text\">Output</label>\n");
    match error {
        Some(err) => {
            page.push_str(
                &format!("<output id=\"output_text\" class=\"error\">{}</output>\n", escape_html(err))
            );
        }
        None => {
            page.push_str(
                &format!(
                    "<output id=\"output_text\">{}</output>\n",
                    escape_html(output.unwrap_or(""))
                )
            );
        }
    }
    page.push_str(PAGE_TAIL);
    page
}
