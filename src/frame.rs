use bitfield_struct::bitfield;
use macro_bits::serializable_enum;

use crate::{
    error::{TalError, TalResult},
    pool::{BufferHandle, SharedPool, MAX_PHY_PACKET_SIZE},
    trx::TrxId,
};

/// Offset of the sequence number in the MPDU.
pub(crate) const SEQ_NUM_POS: usize = 2;
/// Length of an immediate ACK without FCS.
pub(crate) const ACK_LEN_NO_CRC: usize = 3;

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// The frame type field of the frame control field.
    pub enum FrameType: u8 {
        Beacon => 0b000,
        #[default]
        Data => 0b001,
        Ack => 0b010,
        MacCommand => 0b011
    }
}
impl FrameType {
    /// Bitmap of the frame types, that are accepted while not waiting for an ACK.
    pub const DEFAULT_FILTER: u8 = (1 << FrameType::Beacon.into_bits())
        | (1 << FrameType::Data.into_bits())
        | (1 << FrameType::MacCommand.into_bits());
    /// Bitmap, that only accepts ACKs.
    pub const ACK_FILTER: u8 = 1 << FrameType::Ack.into_bits();
}

/// Frame version of IEEE 802.15.4-2006.
pub(crate) const FRAME_VERSION_2006: u8 = 1;

/// The frame control field of an IEEE 802.15.4 MAC header.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct FrameControl {
    #[bits(3)]
    pub frame_type: u8,
    pub security_enabled: bool,
    pub frame_pending: bool,
    pub ack_request: bool,
    pub pan_id_compression: bool,
    #[bits(3)]
    pub __: u8,
    #[bits(2)]
    pub dst_addr_mode: u8,
    #[bits(2)]
    pub frame_version: u8,
    #[bits(2)]
    pub src_addr_mode: u8,
}
impl FrameControl {
    /// Parse the frame control field from the start of an MPDU.
    pub fn parse(mpdu: &[u8]) -> Option<Self> {
        Some(Self::from_bits(u16::from_le_bytes([
            *mpdu.first()?,
            *mpdu.get(1)?,
        ])))
    }
    pub fn is_frame_type(&self, frame_type: FrameType) -> bool {
        self.frame_type() == frame_type.into_bits()
    }
}

/// Check if the MPDU is an immediate ACK, that this TAL can evaluate.
pub(crate) fn is_ack(mpdu: &[u8], len_no_crc: usize) -> bool {
    len_no_crc == ACK_LEN_NO_CRC
        && FrameControl::parse(mpdu).is_some_and(|fcf| {
            fcf.is_frame_type(FrameType::Ack) && fcf.frame_version() <= FRAME_VERSION_2006
        })
}

/// Metadata of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameInfo {
    /// The transceiver, that received the frame.
    pub trx: TrxId,
    /// Length of the MPDU without FCS.
    pub len_no_crc: u16,
    /// Normalized link quality.
    pub lqi: u8,
    /// Raw energy level in dBm.
    pub ed: i8,
}

/// A frame stored in a buffer of the pool.
///
/// Received frames are handed to [TalHandler::rx_frame](crate::TalHandler::rx_frame) in this
/// form and frames for transmission are passed to the TAL as one. Once dropped, the buffer is
/// returned to the pool.
pub struct Frame<'res, const BUFFER_COUNT: usize> {
    pool: &'res SharedPool<BUFFER_COUNT>,
    buffer: Option<BufferHandle>,
    info: FrameInfo,
}
impl<'res, const BUFFER_COUNT: usize> Frame<'res, BUFFER_COUNT> {
    /// Allocate an empty frame from the pool.
    pub fn alloc(pool: &'res SharedPool<BUFFER_COUNT>) -> Option<Self> {
        let buffer = pool.lock(|pool| pool.borrow_mut().alloc(MAX_PHY_PACKET_SIZE))?;
        Some(Self {
            pool,
            buffer: Some(buffer),
            info: FrameInfo {
                trx: TrxId::Rf09,
                len_no_crc: 0,
                lqi: 0,
                ed: 0,
            },
        })
    }
    pub(crate) fn from_parts(
        pool: &'res SharedPool<BUFFER_COUNT>,
        buffer: BufferHandle,
        info: FrameInfo,
    ) -> Self {
        Self {
            pool,
            buffer: Some(buffer),
            info,
        }
    }
    /// Copy the MPDU (without FCS) into the frame.
    pub fn set_mpdu(&mut self, mpdu: &[u8]) -> TalResult<()> {
        let Some(handle) = self.buffer.as_ref() else {
            return Err(TalError::Failure);
        };
        if mpdu.len() > MAX_PHY_PACKET_SIZE {
            return Err(TalError::InvalidParameter);
        }
        self.pool
            .lock(|pool| pool.borrow_mut().buffer_mut(handle)[..mpdu.len()].copy_from_slice(mpdu));
        self.info.len_no_crc = mpdu.len() as u16;
        Ok(())
    }
    /// Run a closure on the MPDU (without FCS).
    pub fn with_mpdu<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let len = self.len();
        self.pool.lock(|pool| {
            let pool = pool.borrow();
            match self.buffer.as_ref() {
                Some(handle) => f(&pool.buffer(handle)[..len]),
                None => f(&[]),
            }
        })
    }
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }
    pub(crate) fn info_mut(&mut self) -> &mut FrameInfo {
        &mut self.info
    }
    /// Length of the MPDU without FCS.
    pub fn len(&self) -> usize {
        self.info.len_no_crc as usize
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn trx(&self) -> TrxId {
        self.info.trx
    }
    pub fn lqi(&self) -> u8 {
        self.info.lqi
    }
    pub fn ed(&self) -> i8 {
        self.info.ed
    }
    pub fn frame_control(&self) -> Option<FrameControl> {
        self.with_mpdu(FrameControl::parse)
    }
    pub fn sequence_number(&self) -> Option<u8> {
        self.with_mpdu(|mpdu| mpdu.get(SEQ_NUM_POS).copied())
    }
}
impl<const BUFFER_COUNT: usize> core::fmt::Debug for Frame<'_, BUFFER_COUNT> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("buffer", &self.buffer)
            .field("info", &self.info)
            .finish()
    }
}
impl<const BUFFER_COUNT: usize> Drop for Frame<'_, BUFFER_COUNT> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            trace!("Buffer {} is now free again.", buffer.index());
            self.pool.lock(|pool| pool.borrow_mut().free(buffer));
        }
    }
}
