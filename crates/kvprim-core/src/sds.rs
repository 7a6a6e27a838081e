//! Binary-safe, length-prefixed byte string with amortized growth.
//!
//! Modeled on a `{ len, free }` header immediately preceding a payload
//! buffer whose last byte is always NUL (not counted in `len`), exactly as
//! the distilled design describes it -- but since Rust ownership already
//! prevents use of a stale view after a reallocating call, there is no
//! separate "handle" type: every mutator simply takes `&mut self`.

use crate::config::SdsConfig;
use crate::error::{KvError, Result};
use std::cmp::Ordering;

/// A binary-safe, NUL-terminated, growable byte string.
#[derive(Clone)]
pub struct Sds {
    len: usize,
    free: usize,
    buf: Vec<u8>,
    config: SdsConfig,
}

impl std::fmt::Debug for Sds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sds")
            .field("len", &self.len)
            .field("free", &self.free)
            .field("bytes", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

impl Default for Sds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Sds {
    /// Builds an `Sds` from an existing `(len, free, buf)` triple, asserting
    /// the NUL-tail and capacity invariants hold.
    fn from_parts(len: usize, free: usize, mut buf: Vec<u8>, config: SdsConfig) -> Self {
        buf.resize(len + free + 1, 0);
        buf[len] = 0;
        Self { len, free, buf, config }
    }

    /// Copies `bytes` into a freshly allocated string with no spare capacity.
    pub fn new(bytes: &[u8]) -> Self {
        Self::from_parts(bytes.len(), 0, bytes.to_vec(), SdsConfig::default())
    }

    /// An empty string with no backing allocation beyond the NUL byte.
    pub fn empty() -> Self {
        Self::from_parts(0, 0, Vec::new(), SdsConfig::default())
    }

    /// Uses a non-default growth policy.
    pub fn with_config(bytes: &[u8], config: SdsConfig) -> Self {
        Self::from_parts(bytes.len(), 0, bytes.to_vec(), config)
    }

    /// Copies bytes up to (not including) the first NUL in `cstr`.
    pub fn from_cstr(cstr: &[u8]) -> Self {
        let end = cstr.iter().position(|&b| b == 0).unwrap_or(cstr.len());
        Self::new(&cstr[..end])
    }

    /// Current content length, excluding the trailing NUL.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the string holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Spare capacity beyond `len`, excluding the trailing NUL byte.
    pub fn avail(&self) -> usize {
        self.free
    }

    /// Total backing allocation: `len + free + 1` (the `+1` is the NUL byte;
    /// the `{len, free}` header itself has no separate allocation in this
    /// port since it is just two `usize` fields on the struct).
    pub fn alloc_size(&self) -> usize {
        self.len + self.free + 1
    }

    /// The string's content, excluding the trailing NUL.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Content as a C-string-style slice including the trailing NUL.
    pub fn as_cstr_bytes(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    /// Fallible core of [`Sds::make_room_for`]: ensures at least `n` bytes of
    /// free space, reallocating with the amortized-growth policy if
    /// necessary (under the prealloc threshold, double `need = len + n`; at
    /// or above it, grow additively). Reports `Err(KvError::Alloc)` instead
    /// of aborting when the allocator cannot satisfy the request.
    pub fn try_make_room_for(&mut self, n: usize) -> Result<()> {
        if self.free >= n {
            return Ok(());
        }
        let need = self.len.saturating_add(n);
        let new_total = if need < self.config.prealloc_threshold {
            need.saturating_mul(2)
        } else {
            need.saturating_add(self.config.prealloc_threshold)
        };
        let target_cap = new_total.saturating_add(1);
        let additional = target_cap.saturating_sub(self.buf.len());
        self.buf.try_reserve(additional).map_err(|_| KvError::Alloc)?;
        let old_free = self.free;
        self.buf.resize(target_cap, 0);
        self.free = new_total - self.len;
        self.buf[self.len] = 0;
        tracing::trace!(
            target: "kvprim::sds",
            old_free,
            new_free = self.free,
            requested = n,
            "growth"
        );
        Ok(())
    }

    /// Ensures at least `n` bytes of free space. Infallible convenience
    /// wrapper over [`Sds::try_make_room_for`] for the common case where
    /// allocation failure is not expected to be recovered from.
    pub fn make_room_for(&mut self, n: usize) {
        self.try_make_room_for(n).expect("sds: allocation failed");
    }

    /// Releases all spare capacity.
    pub fn shrink_to_fit(&mut self) {
        self.buf.truncate(self.len + 1);
        self.buf[self.len] = 0;
        self.free = 0;
    }

    /// Adjusts `len` by `delta` after the caller has written into the spare
    /// capacity directly (or wants to truncate). Restores the trailing NUL.
    ///
    /// # Panics
    /// Panics if `delta` would move `len` outside `[0, len + free]` -- this
    /// is a fatal invariant violation, not a recoverable error.
    pub fn incr_len(&mut self, delta: isize) {
        if delta >= 0 {
            assert!(delta as usize <= self.free, "incr_len past free budget");
            self.len += delta as usize;
            self.free -= delta as usize;
        } else {
            let dec = (-delta) as usize;
            assert!(dec <= self.len, "incr_len negative past len");
            self.len -= dec;
            self.free += dec;
        }
        self.buf[self.len] = 0;
    }

    /// The writable `[len, len + free)` window past the current content,
    /// for filling directly (e.g. a read into the buffer) before calling
    /// [`Sds::incr_len`] to publish what was written. Call
    /// [`Sds::make_room_for`] first to guarantee the window is as large as
    /// needed.
    pub fn spare_capacity_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..self.len + self.free]
    }

    /// Extends the string to at least `total_len`, zero-filling the gap.
    pub fn grow_zero(&mut self, total_len: usize) {
        if total_len <= self.len {
            return;
        }
        let extra = total_len - self.len;
        self.make_room_for(extra);
        for b in &mut self.buf[self.len..total_len] {
            *b = 0;
        }
        self.len = total_len;
        self.free -= extra;
        self.buf[self.len] = 0;
    }

    /// Appends raw bytes.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.make_room_for(bytes.len());
        let start = self.len;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        self.free -= bytes.len();
        self.buf[self.len] = 0;
    }

    /// Appends the content of another `Sds`.
    pub fn append_sds(&mut self, other: &Sds) {
        self.append_bytes(other.as_bytes());
    }

    /// Appends a NUL-terminated byte string (up to its first NUL).
    pub fn append_cstr(&mut self, cstr: &[u8]) {
        let end = cstr.iter().position(|&b| b == 0).unwrap_or(cstr.len());
        self.append_bytes(&cstr[..end]);
    }

    /// Replaces the content with `bytes`, growing the buffer as needed.
    pub fn copy_bytes(&mut self, bytes: &[u8]) {
        if bytes.len() > self.len + self.free {
            let extra = bytes.len() - self.len;
            self.make_room_for(extra.max(0));
        }
        self.buf[..bytes.len()].copy_from_slice(bytes);
        let old_total = self.len + self.free;
        self.len = bytes.len();
        self.free = old_total.saturating_sub(bytes.len());
        self.buf[self.len] = 0;
    }

    /// Restricted `printf`-style formatter: `%s` (C string), `%S` (another
    /// `Sds`), `%i`/`%I` (signed int/i64), `%u`/`%U` (unsigned int/u64),
    /// `%%` (literal). No padding, no precision.
    pub fn cat_fmt(&mut self, fmt: &[u8], args: &[FmtArg<'_>]) -> Result<()> {
        let mut arg_iter = args.iter();
        let mut i = 0;
        while i < fmt.len() {
            if fmt[i] != b'%' {
                self.append_bytes(&fmt[i..i + 1]);
                i += 1;
                continue;
            }
            i += 1;
            if i >= fmt.len() {
                break;
            }
            let directive = fmt[i] as char;
            i += 1;
            match directive {
                '%' => self.append_bytes(b"%"),
                's' => {
                    if let Some(FmtArg::Cstr(s)) = arg_iter.next() {
                        self.append_bytes(s);
                    }
                }
                'S' => {
                    if let Some(FmtArg::Sds(s)) = arg_iter.next() {
                        self.append_bytes(s.as_bytes());
                    }
                }
                'i' => {
                    if let Some(FmtArg::I32(v)) = arg_iter.next() {
                        self.append_bytes(&format_i64(*v as i64));
                    }
                }
                'I' => {
                    if let Some(FmtArg::I64(v)) = arg_iter.next() {
                        self.append_bytes(&format_i64(*v));
                    }
                }
                'u' => {
                    if let Some(FmtArg::U32(v)) = arg_iter.next() {
                        self.append_bytes(&format_u64(*v as u64));
                    }
                }
                'U' => {
                    if let Some(FmtArg::U64(v)) = arg_iter.next() {
                        self.append_bytes(&format_u64(*v));
                    }
                }
                other => return Err(KvError::Format { directive: other }),
            }
        }
        Ok(())
    }

    /// Removes, from both ends, any contiguous run of bytes that appear in
    /// `cset` (a membership set, not a literal prefix/suffix).
    pub fn trim(&mut self, cset: &[u8]) {
        let bytes = self.as_bytes();
        let mut start = 0;
        let mut end = bytes.len();
        while start < end && cset.contains(&bytes[start]) {
            start += 1;
        }
        while end > start && cset.contains(&bytes[end - 1]) {
            end -= 1;
        }
        let trimmed = bytes[start..end].to_vec();
        self.copy_bytes(&trimmed);
    }

    /// In-place slice to the inclusive interval `[start, end]`; negative
    /// indices count from the end (`-1` = last byte). Out-of-range or
    /// ill-ordered intervals yield the empty string.
    pub fn range(&mut self, start: isize, end: isize) {
        let len = self.len as isize;
        if len == 0 {
            return;
        }
        let norm = |idx: isize| -> isize { if idx < 0 { (len + idx).max(0) } else { idx } };
        let mut s = norm(start);
        let mut e = norm(end);
        if s >= len || e < 0 || s > e {
            self.copy_bytes(&[]);
            return;
        }
        if e >= len {
            e = len - 1;
        }
        if s < 0 {
            s = 0;
        }
        let slice = self.as_bytes()[s as usize..=e as usize].to_vec();
        self.copy_bytes(&slice);
    }

    /// Lowercases ASCII letters in place.
    pub fn to_lower(&mut self) {
        for b in &mut self.buf[..self.len] {
            b.make_ascii_lowercase();
        }
    }

    /// Uppercases ASCII letters in place.
    pub fn to_upper(&mut self) {
        for b in &mut self.buf[..self.len] {
            b.make_ascii_uppercase();
        }
    }

    /// Lexicographic comparison over the shared prefix; on a tie, the
    /// longer string is greater. Binary-safe.
    pub fn compare(a: &Sds, b: &Sds) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }

    /// Splits on a literal, possibly multi-byte separator.
    /// `Err(KvError::EmptySeparator)` if the separator is empty. An empty
    /// `bytes` yields an empty vector.
    pub fn split(bytes: &[u8], sep: &[u8]) -> Result<Vec<Sds>> {
        if sep.is_empty() {
            return Err(KvError::EmptySeparator);
        }
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i + sep.len() <= bytes.len() {
            if &bytes[i..i + sep.len()] == sep {
                out.push(Sds::new(&bytes[start..i]));
                i += sep.len();
                start = i;
            } else {
                i += 1;
            }
        }
        out.push(Sds::new(&bytes[start..]));
        Ok(out)
    }

    /// Tokenizes a shell-like line: whitespace-separated tokens, with
    /// double-quoted spans supporting `\n \r \t \b \a \xHH \\ \"` escapes
    /// and single-quoted spans supporting only `\'`.
    pub fn split_args(line: &[u8]) -> Result<Vec<Sds>> {
        let mut out = Vec::new();
        let mut i = 0;
        let len = line.len();
        while i < len {
            while i < len && line[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            let mut token = Vec::new();
            if line[i] == b'"' {
                i += 1;
                loop {
                    if i >= len {
                        return Err(KvError::Unterminated);
                    }
                    match line[i] {
                        b'"' => {
                            i += 1;
                            break;
                        }
                        b'\\' if i + 1 < len => {
                            i += 1;
                            match line[i] {
                                b'n' => token.push(b'\n'),
                                b'r' => token.push(b'\r'),
                                b't' => token.push(b'\t'),
                                b'b' => token.push(0x08),
                                b'a' => token.push(0x07),
                                b'\\' => token.push(b'\\'),
                                b'"' => token.push(b'"'),
                                b'x' if i + 2 < len
                                    && line[i + 1].is_ascii_hexdigit()
                                    && line[i + 2].is_ascii_hexdigit() =>
                                {
                                    let hex = std::str::from_utf8(&line[i + 1..i + 3]).unwrap();
                                    token.push(u8::from_str_radix(hex, 16).unwrap());
                                    i += 2;
                                }
                                other => token.push(other),
                            }
                            i += 1;
                        }
                        other => {
                            token.push(other);
                            i += 1;
                        }
                    }
                }
                if i < len && !line[i].is_ascii_whitespace() {
                    return Err(KvError::TrailingGarbage);
                }
            } else if line[i] == b'\'' {
                i += 1;
                loop {
                    if i >= len {
                        return Err(KvError::Unterminated);
                    }
                    match line[i] {
                        b'\'' => {
                            i += 1;
                            break;
                        }
                        b'\\' if i + 1 < len && line[i + 1] == b'\'' => {
                            token.push(b'\'');
                            i += 2;
                        }
                        other => {
                            token.push(other);
                            i += 1;
                        }
                    }
                }
                if i < len && !line[i].is_ascii_whitespace() {
                    return Err(KvError::TrailingGarbage);
                }
            } else {
                while i < len && !line[i].is_ascii_whitespace() {
                    token.push(line[i]);
                    i += 1;
                }
            }
            out.push(Sds::new(&token));
        }
        Ok(out)
    }

    /// Appends a double-quoted, backslash-escaped representation of
    /// `bytes` -- the inverse of the quoted case of [`Sds::split_args`].
    pub fn cat_repr(&mut self, bytes: &[u8]) {
        self.append_bytes(b"\"");
        for &b in bytes {
            match b {
                b'\\' | b'"' => {
                    self.append_bytes(&[b'\\', b]);
                }
                b'\n' => self.append_bytes(b"\\n"),
                b'\r' => self.append_bytes(b"\\r"),
                b'\t' => self.append_bytes(b"\\t"),
                0x08 => self.append_bytes(b"\\b"),
                0x07 => self.append_bytes(b"\\a"),
                0x20..=0x7e => self.append_bytes(&[b]),
                other => {
                    self.append_bytes(format!("\\x{:02x}", other).as_bytes());
                }
            }
        }
        self.append_bytes(b"\"");
    }

    /// For each position, replaces a byte matching `from[k]` with `to[k]`
    /// (first match wins). Length-preserving, allocation-free.
    pub fn map_chars(&mut self, from: &[u8], to: &[u8]) {
        debug_assert_eq!(from.len(), to.len());
        for b in &mut self.buf[..self.len] {
            if let Some(pos) = from.iter().position(|&f| f == *b) {
                *b = to[pos];
            }
        }
    }

    /// Concatenates byte strings with a separator into a fresh `Sds`.
    pub fn join(parts: &[&[u8]], sep: &[u8]) -> Sds {
        let mut out = Sds::empty();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                out.append_bytes(sep);
            }
            out.append_bytes(part);
        }
        out
    }
}

impl PartialEq for Sds {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for Sds {}

impl PartialOrd for Sds {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Sds {
    fn cmp(&self, other: &Self) -> Ordering {
        Sds::compare(self, other)
    }
}

/// An argument to [`Sds::cat_fmt`].
pub enum FmtArg<'a> {
    Cstr(&'a [u8]),
    Sds(&'a Sds),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
}

/// Hand-rolled digit-emit-then-reverse conversion into a 21-byte buffer
/// (enough for a sign and a full `i64`/`u64` range).
fn format_u64(mut v: u64) -> Vec<u8> {
    let mut buf = [0u8; 21];
    let mut i = 0;
    if v == 0 {
        return vec![b'0'];
    }
    while v > 0 {
        buf[i] = b'0' + (v % 10) as u8;
        v /= 10;
        i += 1;
    }
    buf[..i].reverse();
    buf[..i].to_vec()
}

fn format_i64(v: i64) -> Vec<u8> {
    if v < 0 {
        let mut out = vec![b'-'];
        out.extend(format_u64(v.unsigned_abs()));
        out
    } else {
        format_u64(v as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_round_trip() {
        let mut s = Sds::new(b"foo");
        s.append_bytes(b"bar");
        assert_eq!(s.as_bytes(), b"foobar");
        assert_eq!(s.len(), 6);
        assert_eq!(s.buf[s.len], 0);
    }

    #[test]
    fn range_negative_indices() {
        let mut s = Sds::new(b"foo");
        s.append_bytes(b"bar");
        s.range(-3, -1);
        assert_eq!(s.as_bytes(), b"bar");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn range_out_of_order_is_empty() {
        let mut s = Sds::new(b"hello");
        s.range(3, 1);
        assert_eq!(s.as_bytes(), b"");
    }

    #[test]
    fn cat_fmt_matches_reference_output() {
        let mut s = Sds::empty();
        s.cat_fmt(
            b"--Hello %s World %I,%I--",
            &[
                FmtArg::Cstr(b"Hi!"),
                FmtArg::I64(i64::MIN),
                FmtArg::I64(i64::MAX),
            ],
        )
        .unwrap();
        assert_eq!(
            s.as_bytes(),
            b"--Hello Hi! World -9223372036854775808,9223372036854775807--".as_slice()
        );
    }

    #[test]
    fn cat_fmt_rejects_unknown_directive() {
        let mut s = Sds::empty();
        let err = s.cat_fmt(b"%q", &[]).unwrap_err();
        assert_eq!(err, KvError::Format { directive: 'q' });
    }

    #[test]
    fn trim_strips_byte_set_from_both_ends() {
        let mut s = Sds::new(b"xxciaoyyy");
        s.trim(b"xy");
        assert_eq!(s.as_bytes(), b"ciao");
    }

    #[test]
    fn alloc_size_invariant() {
        let mut s = Sds::new(b"hi");
        s.make_room_for(100);
        assert_eq!(s.alloc_size(), s.len() + s.avail() + 1);
        assert_eq!(s.buf[s.len], 0);
    }

    #[test]
    fn split_on_multibyte_separator() {
        let parts = Sds::split(b"a::b::c", b"::").unwrap();
        let strs: Vec<_> = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
        assert_eq!(strs, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn split_empty_separator_errors() {
        assert_eq!(Sds::split(b"abc", b"").unwrap_err(), KvError::EmptySeparator);
    }

    #[test]
    fn split_empty_input_is_empty_vec() {
        assert_eq!(Sds::split(b"", b",").unwrap().len(), 0);
    }

    #[test]
    fn split_args_handles_quotes_and_escapes() {
        let toks = Sds::split_args(br#"foo "bar baz" 'it\'s' \x41"#).unwrap();
        let strs: Vec<Vec<u8>> = toks.iter().map(|t| t.as_bytes().to_vec()).collect();
        assert_eq!(strs[0], b"foo");
        assert_eq!(strs[1], b"bar baz");
        assert_eq!(strs[2], b"it's");
        // Escapes only apply inside quotes; an unquoted token is taken
        // literally, backslash included.
        assert_eq!(strs[3], br"\x41");
    }

    #[test]
    fn split_args_unterminated_quote_errors() {
        assert_eq!(Sds::split_args(br#"foo "bar"#).unwrap_err(), KvError::Unterminated);
    }

    #[test]
    fn split_args_garbage_after_quote_errors() {
        assert_eq!(
            Sds::split_args(br#""foo"bar"#).unwrap_err(),
            KvError::TrailingGarbage
        );
    }

    #[test]
    fn map_chars_first_match_wins() {
        let mut s = Sds::new(b"hello");
        s.map_chars(b"el", b"ip");
        assert_eq!(s.as_bytes(), b"hippo");
    }

    #[test]
    fn join_concatenates_with_separator() {
        let s = Sds::join(&[b"a", b"b", b"c"], b",");
        assert_eq!(s.as_bytes(), b"a,b,c");
    }

    #[test]
    fn compare_is_binary_safe_and_length_breaks_ties() {
        let a = Sds::new(b"ab\0");
        let b = Sds::new(b"ab\0c");
        assert_eq!(Sds::compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn incr_len_restores_nul_terminator() {
        let mut s = Sds::new(b"hi");
        s.make_room_for(4);
        let spare = s.spare_capacity_mut();
        spare[0] = b'!';
        spare[1] = b'!';
        s.incr_len(2);
        assert_eq!(s.as_bytes(), b"hi!!");
        assert_eq!(s.buf[s.len], 0);
    }

    #[test]
    #[should_panic]
    fn incr_len_past_free_budget_panics() {
        let mut s = Sds::new(b"hi");
        s.incr_len(1);
    }

    #[test]
    fn grow_zero_zero_fills() {
        let mut s = Sds::new(b"hi");
        s.grow_zero(5);
        assert_eq!(s.as_bytes(), b"hi\0\0\0");
    }

    #[test]
    fn try_make_room_for_reports_alloc_failure_on_absurd_request() {
        let mut s = Sds::new(b"hi");
        // A request this large cannot be satisfied by any real allocator;
        // `try_reserve` fails fast on the layout-size check rather than
        // actually touching memory, so this is deterministic.
        assert_eq!(s.try_make_room_for(usize::MAX).unwrap_err(), KvError::Alloc);
        // The failed attempt must not have corrupted the existing string.
        assert_eq!(s.as_bytes(), b"hi");
    }

    #[test]
    fn cat_repr_escapes_non_printable() {
        let mut s = Sds::empty();
        s.cat_repr(b"a\nb\x01");
        assert_eq!(s.as_bytes(), b"\"a\\nb\\x01\"");
    }
}
