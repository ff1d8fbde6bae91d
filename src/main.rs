fn main() -> anyhow::Result<()> {
    sigma::run()?;
    Ok(())
}
