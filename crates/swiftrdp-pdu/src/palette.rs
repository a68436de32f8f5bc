use swiftrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

/// TS_UPDATE_PALETTE_DATA
///
/// Fast-Path palette payload: update type, two pad bytes, then exactly 256
/// RGB entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteUpdateData {
    pub entries: Vec<PaletteEntry>,
}

impl PaletteUpdateData {
    const NAME: &'static str = "TS_UPDATE_PALETTE_DATA";
    const FIXED_PART_SIZE: usize = 2 /* updateType */ + 2 /* pad2Octets */ + 4 /* numberColors */;

    const UPDATE_TYPE_PALETTE: u16 = 0x0002;
    const NUMBER_COLORS: u32 = 256;
}

impl Encode for PaletteUpdateData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(Self::UPDATE_TYPE_PALETTE);
        dst.write_u16(0); // pad2Octets
        dst.write_u32(cast_length!("numberColors", self.entries.len())?);

        for entry in self.entries.iter() {
            dst.write_u8(entry.red);
            dst.write_u8(entry.green);
            dst.write_u8(entry.blue);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.entries.len() * 3
    }
}

impl Decode<'_> for PaletteUpdateData {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _update_type = src.read_u16();
        let _padding = src.read_u16();

        let number_colors = src.read_u32();
        if number_colors != Self::NUMBER_COLORS {
            return Err(invalid_field_err!("numberColors", "palette must hold 256 entries"));
        }

        ensure_size!(in: src, size: 256 * 3);

        let mut entries = Vec::with_capacity(256);
        for _ in 0..256 {
            let red = src.read_u8();
            let green = src.read_u8();
            let blue = src.read_u8();
            entries.push(PaletteEntry { red, green, blue });
        }

        Ok(Self { entries })
    }
}

/// TS_PALETTE_ENTRY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}
