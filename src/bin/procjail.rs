use anyhow::Result;

fn main() -> Result<()> {
    procjail::cli::run()
}
