//! Unpack hex bytes against a schema definition file and dump the result.
//!
//! Usage:
//!   unpack_hex SCHEMA_FILE STRUCT_NAME [HEX|-]
//!
//! With no hex argument, prints the struct's layout (per-field offsets and
//! total size). `-` reads hex from stdin. Hex may contain whitespace.

use anyhow::{anyhow, Context};
use bytestruct::{dump, parse, SizeSpec};
use std::io::Read;

fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err(anyhow!("odd number of hex digits"));
    }
    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16)
                .map_err(|e| anyhow!("bad hex at offset {}: {}", i, e))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: unpack_hex SCHEMA_FILE STRUCT_NAME [HEX|-]");
        std::process::exit(2);
    }

    let source = std::fs::read_to_string(&args[0]).with_context(|| format!("read {}", args[0]))?;
    let set = parse(&source)?;
    let schema = set
        .get(&args[1])
        .ok_or_else(|| anyhow!("no struct `{}` in {}", args[1], args[0]))?;

    if args.len() == 2 {
        for name in schema.field_names() {
            match schema.offset_of(name) {
                Some(off) => println!("{:>6}  {}", off, name),
                None => println!("     ?  {}", name),
            }
        }
        match schema.size() {
            SizeSpec::Fixed(n) => println!(" total  {} bytes", n),
            SizeSpec::Variable => println!(" total  variable"),
        }
        return Ok(());
    }

    let hex = if args[2] == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        args[2..].join("")
    };
    let bytes = parse_hex(&hex)?;
    let inst = schema.unpack(&bytes)?;
    println!("{}", dump::instance_to_dump(&inst, 0));
    Ok(())
}
