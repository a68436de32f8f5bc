/// Negotiated per-connection state consulted on the hot path.
///
/// Built once at session activation from the connection sequence results;
/// never mutated concurrently (the crypto state behind
/// [`crate::envelope::SecurityLayer`] is the only shared resource).
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Standard RDP security is in use and PDUs are encrypted.
    pub encrypting: bool,
    /// Use the salted MAC variant instead of the plain MAC.
    pub secure_checksum: bool,
    /// FIPS encryption method: 4-byte information header and 8-byte block padding.
    pub fips: bool,

    pub supports_relative_mouse: bool,
    pub supports_qoe: bool,
    pub supports_extended_mouse: bool,

    /// The peer accepts Fast-Path output.
    pub fast_path_output_enabled: bool,
    pub compression_enabled: bool,
    /// Peer-advertised maximum size of one reassembled update.
    pub multifrag_max_request_size: u32,

    /// Treat updates without a registered consumer as handled.
    pub deactivate_client_decoding: bool,
}

impl SessionContext {
    /// Number of security envelope bytes between the 3-byte PDU prefix and
    /// the payload: 0, 8, or 12 under FIPS.
    pub fn sec_bytes(&self) -> usize {
        if self.encrypting {
            8 + if self.fips { 4 } else { 0 }
        } else {
            0
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            encrypting: false,
            secure_checksum: false,
            fips: false,
            supports_relative_mouse: false,
            supports_qoe: false,
            supports_extended_mouse: false,
            fast_path_output_enabled: true,
            compression_enabled: false,
            multifrag_max_request_size: 64 * 1024,
            deactivate_client_decoding: false,
        }
    }
}
