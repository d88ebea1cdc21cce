fn main() -> anyhow::Result<()> {
    pocketnotes::cli::run()
}
