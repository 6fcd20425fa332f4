use anyhow::{bail, Context, Error};
use clap::Parser;
use clap_stdin::MaybeStdin;
use isomdl_verifier::definitions::x509::util::common_name_or_unknown;
use isomdl_verifier::definitions::x509::{TrustManager, TrustPoint, X5Chain};
use isomdl_verifier::definitions::{ArfEncryptionInfo, SessionTranscript};
use isomdl_verifier::presentation::reader::{
    DeviceRequestGenerator, ReaderAuthKey, ReaderSigningKey,
};
use isomdl_verifier::verifier::well_known::{self, CredentialFormat, CredentialRequest};
use isomdl_verifier::verifier::ReaderRoot;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Decide whether a PEM certificate chain is anchored in the given trust points.
    VerifyChain {
        /// PEM chain, end-entity certificate first.
        chain: MaybeStdin<String>,
        /// PEM file holding a trusted certificate. May be repeated.
        #[arg(long = "trust-point", required = true)]
        trust_points: Vec<std::path::PathBuf>,
        /// Evaluation time (RFC 3339), defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the hex encoded DeviceRequest of a canned request.
    DeviceRequest {
        /// e.g. `org.iso.18013.5.1.mDL`.
        doc_type: String,
        /// e.g. `age_over_18`, `mandatory` or `full`.
        request_id: String,
        /// Hex encoded SessionTranscript the request is bound to.
        #[arg(long, default_value = "83f6f6f6")]
        transcript: String,
        /// Sign the request with a single-use key from a freshly generated reader root.
        #[arg(long)]
        sign: bool,
    },
    /// Print a hex encoded SessionTranscript.
    Transcript {
        #[command(subcommand)]
        kind: TranscriptKind,
    },
}

#[derive(Debug, clap::Subcommand)]
enum TranscriptKind {
    /// W3C Digital Credentials preview protocol.
    Preview {
        #[arg(long)]
        nonce: String,
        #[arg(long)]
        origin: String,
        /// Hex SEC1 encoded P-256 reader public key.
        #[arg(long)]
        reader_key: String,
    },
    /// W3C Digital Credentials ARF protocol.
    Arf {
        #[arg(long)]
        nonce: String,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        reader_key: String,
    },
    /// OpenID4VP (ISO/IEC 18013-7 Annex B).
    Openid4vp {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        response_uri: String,
        /// JWE `apv`, the authorization request nonce.
        #[arg(long)]
        apv: Option<String>,
        /// JWE `apu`, the mdoc generated nonce.
        #[arg(long)]
        apu: Option<String>,
    },
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let output = match Args::parse().action {
        Action::VerifyChain {
            chain,
            trust_points,
            at,
        } => {
            let trust_points = trust_points
                .iter()
                .map(|path| {
                    std::fs::read_to_string(path)
                        .with_context(|| format!("could not read {}", path.display()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            verify_chain(&chain, &trust_points, at.as_deref())?
        }
        Action::DeviceRequest {
            doc_type,
            request_id,
            transcript,
            sign,
        } => device_request(&doc_type, &request_id, &transcript, sign)?,
        Action::Transcript { kind } => transcript(kind)?,
    };
    println!("{output}");
    Ok(())
}

fn verify_chain(chain: &str, trust_points: &[String], at: Option<&str>) -> Result<String, Error> {
    let chain = X5Chain::from_pem_bundle(chain).context("could not parse the chain")?;
    let mut trust = TrustManager::new();
    for pem in trust_points {
        let certificate = X5Chain::from_pem_bundle(pem).context("could not parse a trust point")?;
        for certificate in certificate.certificates() {
            trust.add_trust_point(TrustPoint::new(certificate));
        }
    }
    let now = match at {
        Some(at) => OffsetDateTime::parse(at, &Rfc3339).context("invalid --at")?,
        None => OffsetDateTime::now_utc(),
    };

    let result = trust.verify_x5chain(&chain, now);
    let output = json!({
        "isTrusted": result.is_trusted,
        "error": result.error.map(|e| e.to_string()),
        "trustChain": result
            .trust_chain
            .iter()
            .map(common_name_or_unknown)
            .collect::<Vec<_>>(),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

fn device_request(
    doc_type: &str,
    request_id: &str,
    transcript: &str,
    sign: bool,
) -> Result<String, Error> {
    let Some(CredentialRequest::Mdoc { spec, .. }) =
        well_known::lookup(CredentialFormat::Mdoc, doc_type, request_id)
    else {
        bail!("no canned mdoc request '{request_id}' for {doc_type}");
    };
    let transcript = hex::decode(transcript).context("transcript is not hex")?;

    let reader_key = if sign {
        Some(ReaderRoot::generate()?.mint()?)
    } else {
        None
    };
    let mut generator = DeviceRequestGenerator::new(transcript);
    generator.add_document_request(
        &spec,
        None,
        reader_key.as_ref().map(|reader| ReaderAuthKey {
            key: ReaderSigningKey::Es256(&reader.key),
            chain: Some(&reader.chain),
        }),
        None,
    )?;
    Ok(hex::encode(generator.generate()?))
}

fn transcript(kind: TranscriptKind) -> Result<String, Error> {
    let reader_key = |hex_key: &str| -> Result<p256::PublicKey, Error> {
        let bytes = hex::decode(hex_key).context("reader key is not hex")?;
        p256::PublicKey::from_sec1_bytes(&bytes).context("reader key is not a P-256 point")
    };
    let transcript = match kind {
        TranscriptKind::Preview {
            nonce,
            origin,
            reader_key: key,
        } => SessionTranscript::dc_preview(
            &hex::decode(nonce).context("nonce is not hex")?,
            &origin,
            &reader_key(&key)?,
        )?,
        TranscriptKind::Arf {
            nonce,
            origin,
            reader_key: key,
        } => SessionTranscript::dc_arf(
            &ArfEncryptionInfo::new(
                &hex::decode(nonce).context("nonce is not hex")?,
                &reader_key(&key)?,
            ),
            &origin,
        )?,
        TranscriptKind::Openid4vp {
            client_id,
            response_uri,
            apv,
            apu,
        } => SessionTranscript::openid4vp(
            &client_id,
            &response_uri,
            apv.as_deref(),
            apu.as_deref(),
        )?,
    };
    Ok(hex::encode(transcript.to_bytes()?))
}
