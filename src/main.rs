use std::env;
use std::fs;
use std::process;

use tarflate::inflate::inflate_to_vec;
use tarflate::tar::list_entries;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: {} <inflate|tar> <path>", args[0]);
        process::exit(2);
    }

    let data = match fs::read(&args[2]) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("{}: {}", args[2], err);
            process::exit(1);
        }
    };

    let result = match args[1].as_str() {
        "inflate" => inflate_to_vec(&data).map(|output| {
            print!("{}", display_data(&output));
        }),
        "tar" => list_entries(&data).map(|entries| {
            for entry in &entries {
                let link = if entry.info.link_name.is_empty() {
                    String::new()
                } else {
                    format!(" -> {}", entry.info.link_name)
                };
                println!(
                    "{} {:>9} {}{}",
                    entry.info.type_flag.as_byte() as char,
                    entry.info.size,
                    entry.info.name,
                    link
                );
            }
        }),
        mode => {
            eprintln!("unknown mode {:?}", mode);
            process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

/// Display the data in hex format.
fn display_data(data: &[u8]) -> String {
    let mut result = String::new();

    for (i, chunk) in data.chunks(16).enumerate() {
        // Print the offset
        result.push_str(&format!("{:08x}: ", i * 16));

        // Print the byte values in hex
        for byte in chunk {
            result.push_str(&format!("{:02x} ", byte));
        }

        // If the chunk is less than 16 bytes, fill the gap
        for _ in 0..(16 - chunk.len()) {
            result.push_str("   ");
        }

        // Print the ASCII representation
        result.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() {
                result.push(*byte as char);
            } else {
                result.push('.');
            }
        }
        result.push_str("|\n");
    }

    result
}
