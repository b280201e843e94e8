fn main() -> anyhow::Result<()> {
    vcf_flatten::cli::run()
}
