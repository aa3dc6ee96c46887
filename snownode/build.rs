fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile(
        &[
            "proto/peer.proto",
            "proto/consensus.proto",
            "proto/message.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}
