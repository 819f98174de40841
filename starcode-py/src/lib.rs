use pyo3::prelude::*;

mod matching;

#[pymodule]
fn _native(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    matching::register(m)?;
    Ok(())
}
