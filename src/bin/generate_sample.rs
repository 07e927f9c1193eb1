use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One pixel's centroid peak list: profile points around each base
/// peak plus uniform low-level noise, sorted by m/z.
fn generate_spectrum(
    peaks: &[(f64, f64, f64)],
    rng: &mut SimpleRng,
) -> (Vec<f64>, Vec<f64>) {
    let mut points: Vec<(f64, f64)> = Vec::new();

    for &(mu, sigma, amp) in peaks {
        let amp = amp * (1.0 + rng.gauss(0.0, 0.1)).max(0.1);
        // Five centroid points across each peak's profile.
        for step in -2i32..=2 {
            let mz = mu + step as f64 * sigma + rng.gauss(0.0, sigma * 0.1);
            points.push((mz, gaussian(mz, mu, sigma, amp)));
        }
    }
    for _ in 0..20 {
        let mz = 600.0 + rng.next_f64() * 400.0;
        points.push((mz, rng.next_f64() * 5.0));
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points.into_iter().unzip()
}

const MANIFEST_HEADER: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1">
  <fileDescription>
    <fileContent>
      <cvParam cvRef="MS" accession="MS:1000579" name="MS1 spectrum" value=""/>
      <cvParam cvRef="IMS" accession="IMS:1000031" name="processed" value=""/>
    </fileContent>
  </fileDescription>
  <referenceableParamGroupList count="2">
    <referenceableParamGroup id="mzArray">
      <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
      <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
      <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
      <cvParam cvRef="IMS" accession="IMS:1000101" name="external data" value="true"/>
    </referenceableParamGroup>
    <referenceableParamGroup id="intensityArray">
      <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" unitCvRef="MS" unitAccession="MS:1000131" unitName="number of detector counts"/>
      <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
      <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
      <cvParam cvRef="IMS" accession="IMS:1000101" name="external data" value="true"/>
    </referenceableParamGroup>
  </referenceableParamGroupList>
  <scanSettingsList count="1">
    <scanSettings id="scanSettings1">
      <cvParam cvRef="IMS" accession="IMS:1000042" name="max count of pixels x" value="COLS"/>
      <cvParam cvRef="IMS" accession="IMS:1000043" name="max count of pixels y" value="ROWS"/>
    </scanSettings>
  </scanSettingsList>
  <run id="SampleRun">
    <spectrumList count="COUNT" defaultDataProcessingRef="none">
"#;

const MANIFEST_FOOTER: &str = r#"    </spectrumList>
  </run>
</mzML>
"#;

fn spectrum_entry(
    index: usize,
    x: usize,
    y: usize,
    n: usize,
    mz_offset: usize,
    int_offset: usize,
) -> String {
    let byte_len = n * 8;
    format!(
        r#"      <spectrum defaultArrayLength="0" id="Scan={scan}" index="{index}">
        <scanList count="1">
          <scan>
            <cvParam cvRef="IMS" accession="IMS:1000050" name="position x" value="{x}"/>
            <cvParam cvRef="IMS" accession="IMS:1000051" name="position y" value="{y}"/>
          </scan>
        </scanList>
        <binaryDataArrayList count="2">
          <binaryDataArray encodedLength="0">
            <referenceableParamGroupRef ref="mzArray"/>
            <cvParam accession="IMS:1000103" cvRef="IMS" name="external array length" value="{n}"/>
            <cvParam accession="IMS:1000104" cvRef="IMS" name="external encoded length" value="{byte_len}"/>
            <cvParam accession="IMS:1000102" cvRef="IMS" name="external offset" value="{mz_offset}"/>
            <binary/>
          </binaryDataArray>
          <binaryDataArray encodedLength="0">
            <referenceableParamGroupRef ref="intensityArray"/>
            <cvParam accession="IMS:1000103" cvRef="IMS" name="external array length" value="{n}"/>
            <cvParam accession="IMS:1000104" cvRef="IMS" name="external encoded length" value="{byte_len}"/>
            <cvParam accession="IMS:1000102" cvRef="IMS" name="external offset" value="{int_offset}"/>
            <binary/>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>
"#,
        scan = index + 1,
    )
}

fn main() {
    let mut rng = SimpleRng::new(42);

    let cols = 12usize;
    let rows = 8usize;

    // Two tissue-like regions with different peak sets
    // (mu, sigma, amplitude).
    let left_peaks: Vec<(f64, f64, f64)> = vec![
        (620.5, 0.08, 800.0),
        (704.2, 0.10, 600.0),
        (851.8, 0.12, 400.0),
    ];
    let right_peaks: Vec<(f64, f64, f64)> = vec![
        (633.1, 0.08, 700.0),
        (760.4, 0.10, 500.0),
        (902.6, 0.12, 650.0),
    ];

    // The .ibd starts with a 16-byte UUID; the arrays follow.
    let mut ibd: Vec<u8> = (0u8..16).collect();
    let mut entries = String::new();
    let mut index = 0usize;

    for y in 1..=rows {
        for x in 1..=cols {
            let peaks = if x <= cols / 2 {
                &left_peaks
            } else {
                &right_peaks
            };
            let (mz, intensity) = generate_spectrum(peaks, &mut rng);

            let mz_offset = ibd.len();
            for v in &mz {
                ibd.extend_from_slice(&v.to_le_bytes());
            }
            let int_offset = ibd.len();
            for v in &intensity {
                ibd.extend_from_slice(&v.to_le_bytes());
            }

            write!(
                entries,
                "{}",
                spectrum_entry(index, x, y, mz.len(), mz_offset, int_offset)
            )
            .expect("formatting spectrum entry");
            index += 1;
        }
    }

    let manifest = MANIFEST_HEADER
        .replace("COLS", &cols.to_string())
        .replace("ROWS", &rows.to_string())
        .replace("COUNT", &index.to_string())
        + &entries
        + MANIFEST_FOOTER;

    let imzml_path = "sample_data.imzML";
    let ibd_path = "sample_data.ibd";
    let mut f = File::create(imzml_path).expect("Failed to create imzML file");
    f.write_all(manifest.as_bytes())
        .expect("Failed to write imzML file");
    std::fs::write(ibd_path, &ibd).expect("Failed to write ibd file");

    println!(
        "Wrote {index} spectra ({cols}×{rows} pixels) to {imzml_path} + {ibd_path}"
    );
}
