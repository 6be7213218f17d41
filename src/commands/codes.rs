use anyhow::Result;
use bufstream_core::message::CodeFamily;
use bufstream_core::MessageCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CodeEntry {
    code: MessageCode,
    name: &'static str,
    family: CodeFamily,
}

fn entries() -> Vec<CodeEntry> {
    MessageCode::ALL
        .iter()
        .map(|&(code, name, family)| CodeEntry { code, name, family })
        .collect()
}

/// Render the code table as aligned text, one code per line.
pub fn render_table() -> String {
    let mut out = String::new();
    for entry in entries() {
        out.push_str(&format!(
            "0x{:08X}  {:<32} {}\n",
            entry.code.0, entry.name, entry.family
        ));
    }
    out
}

pub fn run(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&entries())?);
    } else {
        print!("{}", render_table());
        println!("\n{} codes", MessageCode::ALL.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_every_code_once() {
        let table = render_table();
        assert_eq!(table.lines().count(), MessageCode::ALL.len());
        assert!(table.contains("FLUSH_BUFFER"));
    }

    #[test]
    fn test_json_uses_numeric_codes() {
        let json = serde_json::to_value(entries()).unwrap();
        let flush = json
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["name"] == "FLUSH_BUFFER")
            .unwrap();
        assert_eq!(flush["code"], MessageCode::FLUSH_BUFFER.0);
    }
}
