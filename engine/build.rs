fn main() {
    println!("cargo:rerun-if-env-changed=LOQA_VOICE_DSP_LIB_DIR");

    // The analysis engine is a pre-built static or shared library; only link it
    // when the native backend is requested.
    if std::env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    if let Some(dir) = std::env::var_os("LOQA_VOICE_DSP_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
    println!("cargo:rustc-link-lib=loqa_voice_dsp");
}
