use super::print_json;
use frosty_core::version::version_string;
use frosty_core::VERSION;
use miette::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionResult<'a> {
    name: &'a str,
    version: &'a str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        return print_json(&VersionResult {
            name: "frosty",
            version: VERSION,
        });
    }
    println!("{}", version_string());
    Ok(())
}
