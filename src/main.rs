fn main() -> anyhow::Result<()> {
    effectsync::run()?;
    Ok(())
}
