use std::path::PathBuf;

fn main() {
    // The classifier object is built out of tree; this only pins the default
    // location the control plane looks for it at. `--program` overrides it.
    let elf_path = PathBuf::from("target/bpf").join("udpecho.bpf.o");
    println!(
        "cargo:rustc-env=UDPECHO_PROGRAM_PATH={}",
        elf_path.to_str().unwrap()
    );
    println!("cargo:rerun-if-changed={}", elf_path.to_str().unwrap());
}
