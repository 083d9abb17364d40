//! File addresses and address ranges.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed file address
///
/// Addresses in DWARF are file (link-time) addresses. Keeping them in a
/// newtype stops them from being mixed up with section offsets, sizes, or
/// identifiers, which are all `u64` as well.
///
/// ## Example
///
/// ```rust
/// use symdex_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value (usable in const contexts).
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use symdex_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset from this address, checking for underflow
    #[must_use]
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

/// Half-open address range `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressRange
{
    /// First address in the range
    pub begin: Address,
    /// First address past the range
    pub end: Address,
}

impl AddressRange
{
    /// Build a range from raw begin/end values.
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self
    {
        Self {
            begin: Address::new(begin),
            end: Address::new(end),
        }
    }

    /// Whether `address` falls inside the range.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.begin && address < self.end
    }

    /// Whether the range covers no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.end <= self.begin
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64
    {
        self.end.value().saturating_sub(self.begin.value())
    }
}

impl From<gimli::Range> for AddressRange
{
    fn from(range: gimli::Range) -> Self
    {
        AddressRange::new(range.begin, range.end)
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}
