//! The descriptor-map sidecar: one CSV-like record per line describing how
//! each kernel argument (and each literal sampler or constant buffer) is
//! reached from the Vulkan API side.
//!
//! The format is consumed by the runtime layer, so field order and spelling
//! are contractual.

use std::fmt::Write as _;

#[derive(Default)]
pub struct DescriptorMap {
    out: String,
}

impl DescriptorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A descriptor-bound kernel argument.
    pub fn kernel_arg(
        &mut self,
        kernel: &str,
        arg: &str,
        ordinal: u32,
        descriptor_set: u32,
        binding: u32,
        offset: u32,
        arg_kind: &str,
    ) {
        let _ = writeln!(
            self.out,
            "kernel,{kernel},arg,{arg},argOrdinal,{ordinal},descriptorSet,{descriptor_set},\
             binding,{binding},offset,{offset},argKind,{arg_kind}"
        );
    }

    /// A pointer-to-local argument: no binding, sized by a spec constant.
    pub fn kernel_local_arg(
        &mut self,
        kernel: &str,
        arg: &str,
        ordinal: u32,
        arg_kind: &str,
        elem_size: u32,
        spec_id: i32,
    ) {
        let _ = writeln!(
            self.out,
            "kernel,{kernel},arg,{arg},argOrdinal,{ordinal},argKind,{arg_kind},\
             arrayElemSize,{elem_size},arrayNumElemSpecId,{spec_id}"
        );
    }

    /// A literal sampler from the sampler map.
    pub fn sampler(&mut self, literal: u32, expr: &str, descriptor_set: u32, binding: u32) {
        let _ = writeln!(
            self.out,
            "sampler,{literal},samplerExpr,\"{expr}\",descriptorSet,{descriptor_set},\
             binding,{binding}"
        );
    }

    /// Module-scope `__constant` data bound as a storage buffer.
    pub fn constant_buffer(&mut self, descriptor_set: u32, data: &[u8]) {
        let _ = write!(
            self.out,
            "constant,descriptorSet,{descriptor_set},binding,0,kind,buffer,hexbytes,"
        );
        for byte in data {
            let _ = write!(self.out, "{byte:02x}");
        }
        self.out.push('\n');
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_shapes() {
        let mut m = DescriptorMap::new();
        m.kernel_arg("foo", "a", 0, 0, 0, 0, "buffer");
        m.kernel_local_arg("foo", "l", 1, "local", 4, 3);
        m.sampler(18, "CLK_NORMALIZED_COORDS_FALSE|CLK_ADDRESS_CLAMP", 0, 0);
        m.constant_buffer(1, &[0xde, 0xad, 0x01]);
        let text = m.finish();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "kernel,foo,arg,a,argOrdinal,0,descriptorSet,0,binding,0,offset,0,argKind,buffer"
        );
        assert_eq!(
            lines[1],
            "kernel,foo,arg,l,argOrdinal,1,argKind,local,arrayElemSize,4,arrayNumElemSpecId,3"
        );
        assert_eq!(
            lines[2],
            "sampler,18,samplerExpr,\"CLK_NORMALIZED_COORDS_FALSE|CLK_ADDRESS_CLAMP\",\
             descriptorSet,0,binding,0"
        );
        assert_eq!(lines[3], "constant,descriptorSet,1,binding,0,kind,buffer,hexbytes,dead01");
    }
}
