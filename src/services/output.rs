use crate::domain::models::JsonOut;
use serde::Serialize;

pub fn print_out<T: Serialize>(
    json: bool,
    data: &[T],
    row: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok: true, data })?
        );
    } else {
        for d in data {
            println!("{}", row(d));
        }
    }
    Ok(())
}

pub fn print_one<T: Serialize>(
    json: bool,
    data: T,
    row: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    print_report(json, true, &data, row)
}

/// Like `print_one`, but the envelope carries the caller's verdict in `ok`.
/// Multi-line human text is printed as-is.
pub fn print_report<T: Serialize>(
    json: bool,
    ok: bool,
    data: &T,
    render: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok, data })?
        );
    } else {
        let text = render(data);
        if text.ends_with('\n') {
            print!("{text}");
        } else if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(())
}

/// `['a', 'b']`, the list form used in human-readable messages.
pub fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", quoted.join(", "))
}
