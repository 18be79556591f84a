//! The SystemVerilog keyword tables.
//!
//! Which identifiers act as keywords depends on the active keyword version,
//! which the preprocessor controls through the `begin_keywords and
//! `end_keywords directives. Each keyword records the oldest standard revision
//! that introduced it; a lookup succeeds when the active version is at least
//! that old.

use std::collections::HashMap;
use std::fmt;

/// The standard revisions that can be selected with `begin_keywords.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum KeywordVersion {
    V1364_1995,
    V1364_2001,
    V1364_2005,
    V1800_2005,
    V1800_2009,
    V1800_2012,
    V1800_2017,
}

impl KeywordVersion {
    /// Map a `begin_keywords version string to a keyword version.
    pub fn from_str(s: &str) -> Option<KeywordVersion> {
        Some(match s {
            "1364-1995" => KeywordVersion::V1364_1995,
            "1364-2001" | "1364-2001-noconfig" => KeywordVersion::V1364_2001,
            "1364-2005" => KeywordVersion::V1364_2005,
            "1800-2005" => KeywordVersion::V1800_2005,
            "1800-2009" => KeywordVersion::V1800_2009,
            "1800-2012" => KeywordVersion::V1800_2012,
            "1800-2017" => KeywordVersion::V1800_2017,
            _ => return None,
        })
    }
}

impl Default for KeywordVersion {
    fn default() -> KeywordVersion {
        KeywordVersion::V1800_2017
    }
}

macro_rules! declare_keywords {
    ($( $text:expr => $kw:ident, $version:ident; )*) => {
        /// A SystemVerilog keyword.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum Kw {
            $($kw,)*
        }

        impl Kw {
            /// The source spelling of this keyword.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Kw::$kw => $text,)*
                }
            }

            /// The oldest standard revision in which this is a keyword.
            pub fn min_version(self) -> KeywordVersion {
                match self {
                    $(Kw::$kw => KeywordVersion::$version,)*
                }
            }
        }

        lazy_static! {
            static ref KEYWORD_TABLE: HashMap<&'static str, Kw> = {
                let mut m = HashMap::new();
                $(m.insert($text, Kw::$kw);)*
                m
            };
        }
    }
}

declare_keywords! {
    // IEEE 1364-1995
    "always"             => Always, V1364_1995;
    "and"                => And, V1364_1995;
    "assign"             => Assign, V1364_1995;
    "begin"              => Begin, V1364_1995;
    "buf"                => Buf, V1364_1995;
    "bufif0"             => Bufif0, V1364_1995;
    "bufif1"             => Bufif1, V1364_1995;
    "case"               => Case, V1364_1995;
    "casex"              => Casex, V1364_1995;
    "casez"              => Casez, V1364_1995;
    "cmos"               => Cmos, V1364_1995;
    "deassign"           => Deassign, V1364_1995;
    "default"            => Default, V1364_1995;
    "defparam"           => Defparam, V1364_1995;
    "disable"            => Disable, V1364_1995;
    "edge"               => Edge, V1364_1995;
    "else"               => Else, V1364_1995;
    "end"                => End, V1364_1995;
    "endcase"            => Endcase, V1364_1995;
    "endfunction"        => Endfunction, V1364_1995;
    "endmodule"          => Endmodule, V1364_1995;
    "endprimitive"       => Endprimitive, V1364_1995;
    "endspecify"         => Endspecify, V1364_1995;
    "endtable"           => Endtable, V1364_1995;
    "endtask"            => Endtask, V1364_1995;
    "event"              => Event, V1364_1995;
    "for"                => For, V1364_1995;
    "force"              => Force, V1364_1995;
    "forever"            => Forever, V1364_1995;
    "fork"               => Fork, V1364_1995;
    "function"           => Function, V1364_1995;
    "highz0"             => Highz0, V1364_1995;
    "highz1"             => Highz1, V1364_1995;
    "if"                 => If, V1364_1995;
    "ifnone"             => Ifnone, V1364_1995;
    "initial"            => Initial, V1364_1995;
    "inout"              => Inout, V1364_1995;
    "input"              => Input, V1364_1995;
    "integer"            => Integer, V1364_1995;
    "join"               => Join, V1364_1995;
    "large"              => Large, V1364_1995;
    "macromodule"        => Macromodule, V1364_1995;
    "medium"             => Medium, V1364_1995;
    "module"             => Module, V1364_1995;
    "nand"               => Nand, V1364_1995;
    "negedge"            => Negedge, V1364_1995;
    "nmos"               => Nmos, V1364_1995;
    "nor"                => Nor, V1364_1995;
    "not"                => Not, V1364_1995;
    "notif0"             => Notif0, V1364_1995;
    "notif1"             => Notif1, V1364_1995;
    "or"                 => Or, V1364_1995;
    "output"             => Output, V1364_1995;
    "parameter"          => Parameter, V1364_1995;
    "pmos"               => Pmos, V1364_1995;
    "posedge"            => Posedge, V1364_1995;
    "primitive"          => Primitive, V1364_1995;
    "pull0"              => Pull0, V1364_1995;
    "pull1"              => Pull1, V1364_1995;
    "pulldown"           => Pulldown, V1364_1995;
    "pullup"             => Pullup, V1364_1995;
    "rcmos"              => Rcmos, V1364_1995;
    "real"               => Real, V1364_1995;
    "realtime"           => Realtime, V1364_1995;
    "reg"                => Reg, V1364_1995;
    "release"            => Release, V1364_1995;
    "repeat"             => Repeat, V1364_1995;
    "rnmos"              => Rnmos, V1364_1995;
    "rpmos"              => Rpmos, V1364_1995;
    "rtran"              => Rtran, V1364_1995;
    "rtranif0"           => Rtranif0, V1364_1995;
    "rtranif1"           => Rtranif1, V1364_1995;
    "scalared"           => Scalared, V1364_1995;
    "small"              => Small, V1364_1995;
    "specify"            => Specify, V1364_1995;
    "specparam"          => Specparam, V1364_1995;
    "strong0"            => Strong0, V1364_1995;
    "strong1"            => Strong1, V1364_1995;
    "supply0"            => Supply0, V1364_1995;
    "supply1"            => Supply1, V1364_1995;
    "table"              => Table, V1364_1995;
    "task"               => Task, V1364_1995;
    "time"               => Time, V1364_1995;
    "tran"               => Tran, V1364_1995;
    "tranif0"            => Tranif0, V1364_1995;
    "tranif1"            => Tranif1, V1364_1995;
    "tri"                => Tri, V1364_1995;
    "tri0"               => Tri0, V1364_1995;
    "tri1"               => Tri1, V1364_1995;
    "triand"             => Triand, V1364_1995;
    "trior"              => Trior, V1364_1995;
    "trireg"             => Trireg, V1364_1995;
    "vectored"           => Vectored, V1364_1995;
    "wait"               => Wait, V1364_1995;
    "wand"               => Wand, V1364_1995;
    "weak0"              => Weak0, V1364_1995;
    "weak1"              => Weak1, V1364_1995;
    "while"              => While, V1364_1995;
    "wire"               => Wire, V1364_1995;
    "wor"                => Wor, V1364_1995;
    "xnor"               => Xnor, V1364_1995;
    "xor"                => Xor, V1364_1995;

    // IEEE 1364-2001
    "automatic"          => Automatic, V1364_2001;
    "cell"               => Cell, V1364_2001;
    "config"             => Config, V1364_2001;
    "design"             => Design, V1364_2001;
    "endconfig"          => Endconfig, V1364_2001;
    "endgenerate"        => Endgenerate, V1364_2001;
    "generate"           => Generate, V1364_2001;
    "genvar"             => Genvar, V1364_2001;
    "incdir"             => Incdir, V1364_2001;
    "include"            => Include, V1364_2001;
    "instance"           => Instance, V1364_2001;
    "liblist"            => Liblist, V1364_2001;
    "library"            => Library, V1364_2001;
    "localparam"         => Localparam, V1364_2001;
    "noshowcancelled"    => Noshowcancelled, V1364_2001;
    "pulsestyle_ondetect" => PulsestyleOndetect, V1364_2001;
    "pulsestyle_onevent" => PulsestyleOnevent, V1364_2001;
    "showcancelled"      => Showcancelled, V1364_2001;
    "signed"             => Signed, V1364_2001;
    "unsigned"           => Unsigned, V1364_2001;
    "use"                => Use, V1364_2001;

    // IEEE 1364-2005
    "uwire"              => Uwire, V1364_2005;

    // IEEE 1800-2005
    "alias"              => Alias, V1800_2005;
    "always_comb"        => AlwaysComb, V1800_2005;
    "always_ff"          => AlwaysFf, V1800_2005;
    "always_latch"       => AlwaysLatch, V1800_2005;
    "assert"             => Assert, V1800_2005;
    "assume"             => Assume, V1800_2005;
    "before"             => Before, V1800_2005;
    "bind"               => Bind, V1800_2005;
    "bins"               => Bins, V1800_2005;
    "binsof"             => Binsof, V1800_2005;
    "bit"                => Bit, V1800_2005;
    "break"              => Break, V1800_2005;
    "byte"               => Byte, V1800_2005;
    "chandle"            => Chandle, V1800_2005;
    "class"              => Class, V1800_2005;
    "clocking"           => Clocking, V1800_2005;
    "const"              => Const, V1800_2005;
    "constraint"         => Constraint, V1800_2005;
    "context"            => Context, V1800_2005;
    "continue"           => Continue, V1800_2005;
    "cover"              => Cover, V1800_2005;
    "covergroup"         => Covergroup, V1800_2005;
    "coverpoint"         => Coverpoint, V1800_2005;
    "cross"              => Cross, V1800_2005;
    "dist"               => Dist, V1800_2005;
    "do"                 => Do, V1800_2005;
    "endclass"           => Endclass, V1800_2005;
    "endclocking"        => Endclocking, V1800_2005;
    "endgroup"           => Endgroup, V1800_2005;
    "endinterface"       => Endinterface, V1800_2005;
    "endpackage"         => Endpackage, V1800_2005;
    "endprogram"         => Endprogram, V1800_2005;
    "endproperty"        => Endproperty, V1800_2005;
    "endsequence"        => Endsequence, V1800_2005;
    "enum"               => Enum, V1800_2005;
    "expect"             => Expect, V1800_2005;
    "export"             => Export, V1800_2005;
    "extends"            => Extends, V1800_2005;
    "extern"             => Extern, V1800_2005;
    "final"              => Final, V1800_2005;
    "first_match"        => FirstMatch, V1800_2005;
    "foreach"            => Foreach, V1800_2005;
    "forkjoin"           => Forkjoin, V1800_2005;
    "iff"                => Iff, V1800_2005;
    "ignore_bins"        => IgnoreBins, V1800_2005;
    "illegal_bins"       => IllegalBins, V1800_2005;
    "import"             => Import, V1800_2005;
    "inside"             => Inside, V1800_2005;
    "int"                => Int, V1800_2005;
    "interface"          => Interface, V1800_2005;
    "intersect"          => Intersect, V1800_2005;
    "join_any"           => JoinAny, V1800_2005;
    "join_none"          => JoinNone, V1800_2005;
    "local"              => Local, V1800_2005;
    "logic"              => Logic, V1800_2005;
    "longint"            => Longint, V1800_2005;
    "matches"            => Matches, V1800_2005;
    "modport"            => Modport, V1800_2005;
    "new"                => New, V1800_2005;
    "null"               => Null, V1800_2005;
    "package"            => Package, V1800_2005;
    "packed"             => Packed, V1800_2005;
    "priority"           => Priority, V1800_2005;
    "program"            => Program, V1800_2005;
    "property"           => Property, V1800_2005;
    "protected"          => Protected, V1800_2005;
    "pure"               => Pure, V1800_2005;
    "rand"               => Rand, V1800_2005;
    "randc"              => Randc, V1800_2005;
    "randcase"           => Randcase, V1800_2005;
    "randsequence"       => Randsequence, V1800_2005;
    "ref"                => Ref, V1800_2005;
    "return"             => Return, V1800_2005;
    "sequence"           => Sequence, V1800_2005;
    "shortint"           => Shortint, V1800_2005;
    "shortreal"          => Shortreal, V1800_2005;
    "solve"              => Solve, V1800_2005;
    "static"             => Static, V1800_2005;
    "string"             => String, V1800_2005;
    "struct"             => Struct, V1800_2005;
    "super"              => Super, V1800_2005;
    "tagged"             => Tagged, V1800_2005;
    "this"               => This, V1800_2005;
    "throughout"         => Throughout, V1800_2005;
    "timeprecision"      => Timeprecision, V1800_2005;
    "timeunit"           => Timeunit, V1800_2005;
    "type"               => Type, V1800_2005;
    "typedef"            => Typedef, V1800_2005;
    "union"              => Union, V1800_2005;
    "unique"             => Unique, V1800_2005;
    "var"                => Var, V1800_2005;
    "virtual"            => Virtual, V1800_2005;
    "void"               => Void, V1800_2005;
    "wait_order"         => WaitOrder, V1800_2005;
    "wildcard"           => Wildcard, V1800_2005;
    "with"               => With, V1800_2005;
    "within"             => Within, V1800_2005;

    // IEEE 1800-2009
    "accept_on"          => AcceptOn, V1800_2009;
    "checker"            => Checker, V1800_2009;
    "endchecker"         => Endchecker, V1800_2009;
    "eventually"         => Eventually, V1800_2009;
    "global"             => Global, V1800_2009;
    "implies"            => Implies, V1800_2009;
    "let"                => Let, V1800_2009;
    "nexttime"           => Nexttime, V1800_2009;
    "reject_on"          => RejectOn, V1800_2009;
    "restrict"           => Restrict, V1800_2009;
    "s_always"           => SAlways, V1800_2009;
    "s_eventually"       => SEventually, V1800_2009;
    "s_nexttime"         => SNexttime, V1800_2009;
    "s_until"            => SUntil, V1800_2009;
    "s_until_with"       => SUntilWith, V1800_2009;
    "strong"             => Strong, V1800_2009;
    "sync_accept_on"     => SyncAcceptOn, V1800_2009;
    "sync_reject_on"     => SyncRejectOn, V1800_2009;
    "unique0"            => Unique0, V1800_2009;
    "until"              => Until, V1800_2009;
    "until_with"         => UntilWith, V1800_2009;
    "untyped"            => Untyped, V1800_2009;
    "weak"               => Weak, V1800_2009;

    // IEEE 1800-2012
    "implements"         => Implements, V1800_2012;
    "interconnect"       => Interconnect, V1800_2012;
    "nettype"            => Nettype, V1800_2012;
    "soft"               => Soft, V1800_2012;
}

impl fmt::Display for Kw {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Look up a keyword under a given keyword version. Returns `None` if the
/// string is not a keyword, or not yet a keyword in that version.
pub fn find_keyword(name: &str, version: KeywordVersion) -> Option<Kw> {
    KEYWORD_TABLE
        .get(name)
        .copied()
        .filter(|kw| kw.min_version() <= version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_lookup() {
        assert_eq!(
            find_keyword("module", KeywordVersion::V1364_1995),
            Some(Kw::Module)
        );
        assert_eq!(find_keyword("logic", KeywordVersion::V1364_2001), None);
        assert_eq!(
            find_keyword("logic", KeywordVersion::V1800_2005),
            Some(Kw::Logic)
        );
        assert_eq!(find_keyword("soft", KeywordVersion::V1800_2009), None);
        assert_eq!(
            find_keyword("soft", KeywordVersion::V1800_2012),
            Some(Kw::Soft)
        );
        assert_eq!(find_keyword("not_a_keyword", KeywordVersion::V1800_2017), None);
    }
}
